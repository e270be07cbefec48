//! Notification dispatcher.
//!
//! Entry points invoked by a backend, on whatever thread it delivers from.
//! Each notification performs at most one registry transition under the
//! registry lock and emits at most one change event. Failures are logged and
//! confined to the notification that caused them.

use super::backend::{DeviceBackend, NotificationSink};
use super::device::{DeviceEvent, DeviceRole, DeviceState, Direction, VolumeState};
use super::events::{AffectedDevice, ChangeType};
use super::manager::{log_track_failure, Shared};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

/// Delivers backend notifications to an endpoint manager.
///
/// Holds only a weak reference, so a backend keeping a dispatcher alive does
/// not keep the manager alive. Notifications arriving after the manager is
/// dropped or shut down are ignored.
pub struct NotificationDispatcher<B: DeviceBackend> {
    shared: Weak<Shared<B>>,
}

impl<B: DeviceBackend> Clone for NotificationDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<B: DeviceBackend> NotificationDispatcher<B> {
    pub(crate) fn new(shared: Weak<Shared<B>>) -> Self {
        Self { shared }
    }

    /// Route a backend notification to its handler.
    pub fn dispatch(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::DeviceAdded { device_id } => self.on_device_added(&device_id),
            DeviceEvent::DeviceRemoved { device_id } => self.on_device_removed(&device_id),
            DeviceEvent::DeviceStateChanged {
                device_id,
                new_state,
            } => self.on_device_state_changed(&device_id, new_state),
            DeviceEvent::DefaultDeviceChanged {
                direction,
                role,
                device_id,
            } => self.on_default_device_changed(direction, role, device_id.as_deref()),
            DeviceEvent::PropertyValueChanged { device_id } => {
                self.on_property_value_changed(&device_id)
            }
            DeviceEvent::VolumeChanged { device_id, volume } => {
                self.on_volume_changed(&device_id, volume)
            }
        }
    }

    pub fn on_device_added(&self, device_id: &str) {
        if let Some(shared) = self.upgrade() {
            shared.handle_added(device_id);
        }
    }

    pub fn on_device_removed(&self, device_id: &str) {
        if let Some(shared) = self.upgrade() {
            shared.handle_removed(device_id);
        }
    }

    pub fn on_device_state_changed(&self, device_id: &str, new_state: DeviceState) {
        if let Some(shared) = self.upgrade() {
            match new_state {
                DeviceState::Active => shared.handle_added(device_id),
                DeviceState::Disabled | DeviceState::NotPresent | DeviceState::Unplugged => {
                    shared.handle_removed(device_id)
                }
            }
        }
    }

    pub fn on_default_device_changed(
        &self,
        direction: Direction,
        role: DeviceRole,
        device_id: Option<&str>,
    ) {
        if let Some(shared) = self.upgrade() {
            shared.handle_default_changed(direction, role, device_id);
        }
    }

    /// Accepted and ignored.
    pub fn on_property_value_changed(&self, device_id: &str) {
        trace!(device_id, "Ignoring property change");
    }

    /// Volume or mute changed on `device_id`, reported outside a subscription callback.
    pub fn on_volume_changed(&self, device_id: &str, volume: VolumeState) {
        if let Some(shared) = self.upgrade() {
            shared.handle_volume_changed(device_id, None, volume);
        }
    }

    fn upgrade(&self) -> Option<Arc<Shared<B>>> {
        let shared = self.shared.upgrade();
        if shared.is_none() {
            trace!("Notification after endpoint manager was dropped");
        }
        shared
    }
}

impl<B: DeviceBackend> NotificationSink for NotificationDispatcher<B> {
    fn notify(&self, event: DeviceEvent) {
        self.dispatch(event);
    }
}

impl<B: DeviceBackend> Shared<B> {
    /// absent -> active
    pub(crate) fn handle_added(self: &Arc<Self>, device_id: &str) {
        let device = match self.backend.get_device(device_id) {
            Ok(Some(device)) => device,
            Ok(None) => {
                trace!(device_id, "Ignoring add for unknown device");
                return;
            }
            Err(e) => {
                warn!(device_id, error = %e, "Failed to open added device");
                return;
            }
        };

        let mut tracked = match self.inspect(device, |_| None) {
            Ok(Some(tracked)) => tracked,
            Ok(None) => {
                trace!(device_id, "Ignoring add for inactive or untracked device");
                return;
            }
            Err(e) => {
                warn!(device_id, error = %e, "Failed to read added device");
                return;
            }
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shut_down {
            return;
        }
        if state.registry.contains(&tracked.record.id) {
            trace!(device_id, "Device already tracked");
            return;
        }
        // A removal may have been handled between the reads above and the lock.
        if !self.is_still_active(&tracked.device) {
            trace!(device_id, "Device left the active state before it was tracked");
            return;
        }

        let id = tracked.record.id.clone();
        tracked.record.is_default =
            self.default_device_id(tracked.record.direction).as_deref() == Some(id.as_str());
        let weak = Arc::downgrade(self);
        let handler_id = id.clone();
        match state.registry.track(&self.backend, tracked, move |generation| {
            Shared::volume_handler(weak, handler_id, generation)
        }) {
            Ok(generation) => {
                let record = state.registry.get(&id).cloned();
                debug!(device_id = %id, generation, "Device added");
                let affected = record.map(AffectedDevice::Device).unwrap_or(AffectedDevice::None);
                state.emit(ChangeType::Added, affected);
            }
            Err(e) => log_track_failure(&id, &e),
        }
    }

    /// active -> absent
    pub(crate) fn handle_removed(&self, device_id: &str) {
        let handle = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            let (record, handle) = state.registry.untrack(device_id);
            match record {
                Some(record) => {
                    debug!(device_id, name = %record.name, "Device removed");
                    state.emit(ChangeType::Removed, AffectedDevice::Id(device_id.to_string()));
                }
                None if handle.is_some() => {
                    error!(device_id, "Subscription found without a tracked record");
                }
                None => trace!(device_id, "Ignoring removal of untracked device"),
            }
            handle
        };

        if let Some(handle) = handle {
            handle.release(&self.backend);
        }
    }

    pub(crate) fn handle_default_changed(
        &self,
        direction: Direction,
        role: DeviceRole,
        device_id: Option<&str>,
    ) {
        if role != self.config.role {
            trace!(?role, "Ignoring default change for another role");
            return;
        }
        if !self.config.tracks(direction) {
            trace!(%direction, "Ignoring default change for untracked direction");
            return;
        }

        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        let is_tracked = state.registry.set_default(direction, device_id);
        // An untracked default has no snapshot to carry.
        let affected = match device_id {
            Some(id) if is_tracked => state
                .registry
                .get(id)
                .cloned()
                .map(AffectedDevice::Device)
                .unwrap_or(AffectedDevice::None),
            _ => AffectedDevice::None,
        };
        debug!(%direction, device_id = ?device_id, "Default device changed");
        state.emit(ChangeType::DefaultChanged, affected);
    }

    /// active -> active, only if the rounded volume or the mute state changed.
    ///
    /// `generation` identifies the subscription that produced the callback;
    /// callbacks from a subscription that has since been replaced are dropped.
    pub(crate) fn handle_volume_changed(
        &self,
        device_id: &str,
        generation: Option<u64>,
        volume: VolumeState,
    ) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        if let Some(generation) = generation {
            if state.registry.subscription_generation(device_id) != Some(generation) {
                trace!(device_id, generation, "Dropping callback from a released subscription");
                return;
            }
        }

        let record = match state.registry.get_mut(device_id) {
            Some(record) => record,
            None => {
                trace!(device_id, "Volume change for untracked device");
                return;
            }
        };
        if !record.apply_volume(volume) {
            trace!(device_id, "Volume tick without visible change");
            return;
        }

        let record = record.clone();
        debug!(
            device_id,
            volume = record.volume_percent,
            muted = record.is_muted,
            "Volume changed"
        );
        state.emit(ChangeType::VolumeChanged, AffectedDevice::Device(record));
    }
}
