//! Audio Endpoint Manager - Library
//!
//! Keeps a live registry of the system's audio endpoints, their default
//! status, volume and mute state, and reports every change on a channel.
//!
//! ## Features
//!
//! - Enumerate render and capture endpoints with their mix format
//! - Track hot-plug, state and default-device changes
//! - One volume subscription per tracked endpoint, released exactly once
//! - Set, step, mute and toggle volume on the default or any tracked device
//! - Windows Core Audio backend and an in-process backend for tests and demos

pub mod audio;
pub mod config;
pub mod platform;

pub use audio::{
    create_event_channel, AudioError, ChangeEvent, ChangeType, DeviceBackend, DeviceRecord,
    Direction, EndpointManager, MemoryBackend,
};
pub use config::ManagerConfig;
