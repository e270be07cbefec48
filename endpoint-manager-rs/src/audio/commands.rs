//! Volume and mute commands.
//!
//! Commands resolve a target under the registry lock, release it, and issue
//! exactly one backend write. They never touch the cached state: the write
//! comes back through the target's volume callback, which is the only path
//! that updates cached volume and mute. Steps and toggles start from a live
//! hardware read, since the cache lags behind writes still being echoed.

use super::backend::DeviceBackend;
use super::device::{AudioError, Direction, Result, VolumeState};
use super::manager::{validate_step, EndpointManager};
use crate::config::volume::{MAX_PERCENT, MIN_PERCENT};
use tracing::debug;

/// A resolved command target.
struct Target<D> {
    device: D,
    device_id: String,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Up,
    Down,
}

impl<B: DeviceBackend> EndpointManager<B> {
    /// Set the increment/decrement step, in percent. Must be in (0, 100].
    pub fn set_step_volume(&self, step: f32) -> Result<()> {
        validate_step(step)?;
        *self.shared.step_volume.lock() = step;
        debug!(step, "Step volume set");
        Ok(())
    }

    /// Set the volume of the default render device (0 to 100).
    pub fn set_volume(&self, value: f32) -> Result<()> {
        validate_volume(value)?;
        let target = self.default_target()?;
        self.write_volume(&target, value)
    }

    pub fn set_volume_by_id(&self, device_id: &str, value: f32) -> Result<()> {
        validate_volume(value)?;
        let target = self.target_by_id(device_id)?;
        self.write_volume(&target, value)
    }

    pub fn increment_volume(&self) -> Result<()> {
        let target = self.default_target()?;
        self.step_volume_of(&target, Step::Up)
    }

    pub fn decrement_volume(&self) -> Result<()> {
        let target = self.default_target()?;
        self.step_volume_of(&target, Step::Down)
    }

    pub fn increment_volume_by_id(&self, device_id: &str) -> Result<()> {
        let target = self.target_by_id(device_id)?;
        self.step_volume_of(&target, Step::Up)
    }

    pub fn decrement_volume_by_id(&self, device_id: &str) -> Result<()> {
        let target = self.target_by_id(device_id)?;
        self.step_volume_of(&target, Step::Down)
    }

    pub fn set_mute(&self) -> Result<()> {
        let target = self.default_target()?;
        self.write_mute(&target, true)
    }

    pub fn set_mute_by_id(&self, device_id: &str) -> Result<()> {
        let target = self.target_by_id(device_id)?;
        self.write_mute(&target, true)
    }

    pub fn set_un_mute(&self) -> Result<()> {
        let target = self.default_target()?;
        self.write_mute(&target, false)
    }

    pub fn set_un_mute_by_id(&self, device_id: &str) -> Result<()> {
        let target = self.target_by_id(device_id)?;
        self.write_mute(&target, false)
    }

    pub fn toggle_muted(&self) -> Result<()> {
        let target = self.default_target()?;
        self.toggle_mute_of(&target)
    }

    pub fn toggle_muted_by_id(&self, device_id: &str) -> Result<()> {
        let target = self.target_by_id(device_id)?;
        self.toggle_mute_of(&target)
    }

    /// Whatever the backend currently reports as the default render device.
    fn default_target(&self) -> Result<Target<B::Device>> {
        let shared = &self.shared;
        if shared.state.lock().shut_down {
            return Err(AudioError::ShutDown);
        }

        let device = shared
            .backend
            .get_default_device(Direction::Render, shared.config.role)?
            .ok_or(AudioError::NoDefaultDevice {
                direction: Direction::Render,
            })?;
        let device_id = shared.backend.device_id(&device)?;
        Ok(Target { device, device_id })
    }

    /// A device tracked by the registry.
    fn target_by_id(&self, device_id: &str) -> Result<Target<B::Device>> {
        let state = self.shared.state.lock();
        if state.shut_down {
            return Err(AudioError::ShutDown);
        }
        let not_found = || AudioError::DeviceNotFound {
            device_id: device_id.to_string(),
        };
        let device = state.registry.device(device_id).ok_or_else(not_found)?;
        Ok(Target {
            device,
            device_id: device_id.to_string(),
        })
    }

    fn current_volume(&self, target: &Target<B::Device>) -> Result<VolumeState> {
        self.shared.backend.read_volume(&target.device)
    }

    fn toggle_mute_of(&self, target: &Target<B::Device>) -> Result<()> {
        let muted = self.current_volume(target)?.muted;
        self.write_mute(target, !muted)
    }

    fn step_volume_of(&self, target: &Target<B::Device>, step: Step) -> Result<()> {
        let current = self.current_volume(target)?.percent;
        let amount = self.step_volume();
        let next = match step {
            Step::Up => current + amount,
            Step::Down => current - amount,
        };
        self.write_volume(target, next.clamp(MIN_PERCENT, MAX_PERCENT))
    }

    fn write_volume(&self, target: &Target<B::Device>, percent: f32) -> Result<()> {
        debug!(device_id = %target.device_id, percent, "Writing volume");
        self.shared.backend.write_volume(&target.device, percent)
    }

    fn write_mute(&self, target: &Target<B::Device>, muted: bool) -> Result<()> {
        debug!(device_id = %target.device_id, muted, "Writing mute");
        self.shared.backend.write_mute(&target.device, muted)
    }
}

fn validate_volume(value: f32) -> Result<()> {
    if value.is_finite() && (MIN_PERCENT..=MAX_PERCENT).contains(&value) {
        Ok(())
    } else {
        Err(AudioError::InvalidArgument(format!(
            "volume must be between 0 and 100, got {value}"
        )))
    }
}
