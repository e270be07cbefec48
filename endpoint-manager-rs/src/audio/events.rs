//! Change events emitted after every registry transition.

use super::device::DeviceRecord;
use std::sync::mpsc::{Receiver, Sender};
use tracing::trace;

/// Kind of registry transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// Initial scan completed
    Initial,

    /// A device started being tracked
    Added,

    /// A device stopped being tracked
    Removed,

    /// The default device changed for one direction
    DefaultChanged,

    /// Cached volume or mute changed for one device
    VolumeChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Initial => "Initial",
            ChangeType::Added => "Added",
            ChangeType::Removed => "Removed",
            ChangeType::DefaultChanged => "DefaultChanged",
            ChangeType::VolumeChanged => "VolumeChanged",
        }
    }
}

/// The device a change refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffectedDevice {
    /// No single tracked device (initial scan, or a default that is not tracked)
    None,

    /// Full snapshot of the affected device at the time of the change
    Device(DeviceRecord),

    /// Id only: the device was removed
    Id(String),
}

impl AffectedDevice {
    pub fn id(&self) -> Option<&str> {
        match self {
            AffectedDevice::None => None,
            AffectedDevice::Device(record) => Some(&record.id),
            AffectedDevice::Id(id) => Some(id),
        }
    }
}

/// Immutable description of one registry transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub change_type: ChangeType,
    pub affected: AffectedDevice,

    /// Every tracked device after the transition, ordered by id
    pub devices: Vec<DeviceRecord>,
}

/// Creates the outbound change-event channel.
pub fn create_event_channel() -> (Sender<ChangeEvent>, Receiver<ChangeEvent>) {
    std::sync::mpsc::channel()
}

/// Sending half of the change-event channel.
pub(crate) struct EventEmitter {
    sender: Sender<ChangeEvent>,
}

impl EventEmitter {
    pub(crate) fn new(sender: Sender<ChangeEvent>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, change_type: ChangeType, affected: AffectedDevice, devices: Vec<DeviceRecord>) {
        let event = ChangeEvent {
            change_type,
            affected,
            devices,
        };
        if self.sender.send(event).is_err() {
            trace!(change = change_type.as_str(), "Change event receiver dropped");
        }
    }
}
