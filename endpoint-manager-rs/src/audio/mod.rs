//! Audio endpoint registry.
//!
//! This module provides the device model, the backend abstraction, the
//! registry of tracked endpoints with their volume subscriptions, and the
//! manager that keeps both in sync with backend notifications.

pub mod backend;
mod commands;
pub mod device;
pub mod events;
mod manager;
pub mod memory;
mod notifications;
mod registry;
mod subscription;

pub use backend::{DeviceBackend, NotificationSink, VolumeHandler};
pub use device::{
    AudioError, AudioFormat, DeviceEvent, DeviceRecord, DeviceRole, DeviceState, Direction,
    EndpointInfo, Result, VolumeState,
};
pub use events::{create_event_channel, AffectedDevice, ChangeEvent, ChangeType};
pub use manager::EndpointManager;
pub use memory::{Delivery, FailPoint, MemoryBackend, MemoryDevice, WriteRecord};
pub use notifications::NotificationDispatcher;
