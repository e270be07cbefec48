//! Configuration for the endpoint manager.

use crate::audio::{DeviceRole, Direction};

/// Volume-related constants
pub mod volume {
    /// Step used by increment/decrement until `set_step_volume` is called
    pub const DEFAULT_STEP_PERCENT: f32 = 2.0;

    /// Lowest settable volume
    pub const MIN_PERCENT: f32 = 0.0;

    /// Highest settable volume, and the largest allowed step
    pub const MAX_PERCENT: f32 = 100.0;
}

/// Endpoint manager settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Role whose default endpoint is tracked; default-change notifications
    /// for other roles are discarded.
    pub role: DeviceRole,

    /// Directions to enumerate and track
    pub directions: Vec<Direction>,

    /// Initial increment/decrement step, in percent
    pub step_volume: f32,
}

impl ManagerConfig {
    pub fn with_role(mut self, role: DeviceRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_directions(mut self, directions: impl IntoIterator<Item = Direction>) -> Self {
        self.directions = directions.into_iter().collect();
        self.directions.sort();
        self.directions.dedup();
        self
    }

    pub fn with_step_volume(mut self, step: f32) -> Self {
        self.step_volume = step;
        self
    }

    /// Whether endpoints of `direction` are tracked.
    pub fn tracks(&self, direction: Direction) -> bool {
        self.directions.contains(&direction)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::Multimedia,
            directions: Direction::ALL.to_vec(),
            step_volume: volume::DEFAULT_STEP_PERCENT,
        }
    }
}
