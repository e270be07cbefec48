//! Endpoint manager: owns the backend, the registry and the event channel.
//!
//! One mutex guards the registry's record and subscription maps together.
//! Notification transitions and command lookups take it for their full
//! duration, including the paired attach. Backend reads and writes, and the
//! native release of detached subscriptions, happen outside it.

use super::backend::{DeviceBackend, VolumeHandler};
use super::device::{AudioError, DeviceRecord, Direction, Result};
use super::events::{AffectedDevice, ChangeEvent, ChangeType, EventEmitter};
use super::notifications::NotificationDispatcher;
use super::registry::{Registry, TrackedDevice};
use super::subscription::SubscriptionHandle;
use crate::config::{self, ManagerConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// Registry plus lifecycle flags, guarded by one mutex.
pub(crate) struct CoreState<B: DeviceBackend> {
    pub(crate) registry: Registry<B::Device, B::Subscription>,
    emitter: EventEmitter,
    watching: bool,
    pub(crate) shut_down: bool,
}

impl<B: DeviceBackend> CoreState<B> {
    /// Emit a change event carrying the current snapshot.
    pub(crate) fn emit(&self, change_type: ChangeType, affected: AffectedDevice) {
        self.emitter
            .emit(change_type, affected, self.registry.snapshot());
    }
}

pub(crate) struct Shared<B: DeviceBackend> {
    pub(crate) backend: B,
    pub(crate) config: ManagerConfig,
    pub(crate) state: Mutex<CoreState<B>>,
    pub(crate) step_volume: Mutex<f32>,
}

impl<B: DeviceBackend> Shared<B> {
    /// Build the volume callback for one subscription generation.
    pub(crate) fn volume_handler(
        weak: Weak<Shared<B>>,
        device_id: String,
        generation: u64,
    ) -> VolumeHandler {
        Box::new(move |volume| match weak.upgrade() {
            Some(shared) => shared.handle_volume_changed(&device_id, Some(generation), volume),
            None => trace!(device_id = %device_id, "Volume callback after manager was dropped"),
        })
    }

    /// Current OS default for `direction` and the configured role, by id.
    pub(crate) fn default_device_id(&self, direction: Direction) -> Option<String> {
        match self.backend.get_default_device(direction, self.config.role) {
            Ok(Some(device)) => match self.backend.device_id(&device) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(%direction, error = %e, "Failed to read default device id");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(%direction, error = %e, "No default device");
                None
            }
        }
    }

    /// Read everything needed to track `device`. `Ok(None)` if the device is
    /// not active or its direction is not tracked.
    ///
    /// `default_id` is asked for the default of the device's direction.
    pub(crate) fn inspect(
        &self,
        device: B::Device,
        default_id: impl FnOnce(Direction) -> Option<String>,
    ) -> Result<Option<TrackedDevice<B::Device>>> {
        let info = self.backend.describe(&device)?;
        if !info.state.is_active() || !self.config.tracks(info.direction) {
            return Ok(None);
        }
        let volume = self.backend.read_volume(&device)?;
        let is_default = default_id(info.direction).as_deref() == Some(info.id.as_str());
        Ok(Some(TrackedDevice {
            record: DeviceRecord::from_parts(info, volume, is_default),
            device,
        }))
    }

    /// Re-read the state of `device`. Used under the registry lock to confirm
    /// a transition decided from reads taken before the lock.
    pub(crate) fn is_still_active(&self, device: &B::Device) -> bool {
        match self.backend.device_state(device) {
            Ok(state) => state.is_active(),
            Err(e) => {
                debug!(error = %e, "Failed to re-read device state");
                false
            }
        }
    }

    /// Release detached subscriptions. Must run without the registry lock held.
    pub(crate) fn release_all(&self, handles: Vec<SubscriptionHandle<B::Subscription>>) {
        for handle in handles {
            handle.release(&self.backend);
        }
    }
}

/// Live registry of audio endpoints.
///
/// Construct one per backend, call [`initialize_devices`](Self::initialize_devices)
/// to scan and start receiving notifications, and [`shutdown`](Self::shutdown)
/// (or drop it) before releasing the backend.
pub struct EndpointManager<B: DeviceBackend> {
    pub(crate) shared: Arc<Shared<B>>,
}

impl<B: DeviceBackend> EndpointManager<B> {
    /// Create a manager that reports changes on `events`.
    pub fn new(backend: B, config: ManagerConfig, events: Sender<ChangeEvent>) -> Result<Self> {
        validate_step(config.step_volume)?;
        let step = config.step_volume;

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                config,
                state: Mutex::new(CoreState {
                    registry: Registry::new(),
                    emitter: EventEmitter::new(events),
                    watching: false,
                    shut_down: false,
                }),
                step_volume: Mutex::new(step),
            }),
        })
    }

    /// Scan every configured direction, reconcile the registry with what the
    /// backend reports, and emit one `Initial` event.
    ///
    /// The first call also registers for endpoint notifications. Calling it
    /// again resyncs: devices that disappeared are detached, new devices are
    /// attached, and tracked devices keep their single subscription.
    ///
    /// Notifications may arrive while the scan runs. Devices attached by them
    /// are kept, and every attach or detach decided from the scan is confirmed
    /// against the device's current state under the registry lock.
    pub fn initialize_devices(&self) -> Result<()> {
        let shared = &self.shared;

        // Subscription generations as of the start of the scan. Anything
        // attached later came from a notification newer than the scan.
        let tracked_before: HashMap<String, Option<u64>> = {
            let mut state = shared.state.lock();
            if state.shut_down {
                return Err(AudioError::ShutDown);
            }
            if !state.watching {
                shared
                    .backend
                    .register_endpoint_notifications(Arc::new(self.dispatcher()))?;
                state.watching = true;
                debug!("Registered for endpoint notifications");
            }
            let registry = &state.registry;
            let generations = registry
                .ids()
                .into_iter()
                .map(|id| {
                    let generation = registry.subscription_generation(&id);
                    (id, generation)
                })
                .collect();
            generations
        };

        let mut discovered = Vec::new();
        let mut scanned = HashSet::new();
        for &direction in &shared.config.directions {
            let devices = match shared.backend.enumerate_active_devices(direction) {
                Ok(devices) => devices,
                Err(e) => {
                    warn!(%direction, error = %e, "Failed to enumerate devices");
                    continue;
                }
            };
            for device in devices {
                match shared.inspect(device, |_| None) {
                    Ok(Some(tracked)) => discovered.push(tracked),
                    Ok(None) => {}
                    Err(e) => warn!(%direction, error = %e, "Skipping unreadable device"),
                }
            }
            scanned.insert(direction);
        }

        let released = {
            let mut guard = shared.state.lock();
            let state = &mut *guard;
            if state.shut_down {
                return Err(AudioError::ShutDown);
            }

            let present: HashSet<String> =
                discovered.iter().map(|t| t.record.id.clone()).collect();
            let mut released = Vec::new();
            for id in state.registry.ids() {
                let in_scope = state
                    .registry
                    .get(&id)
                    .map(|r| scanned.contains(&r.direction))
                    .unwrap_or(false);
                if !in_scope || present.contains(&id) {
                    continue;
                }
                if tracked_before.get(&id) != Some(&state.registry.subscription_generation(&id)) {
                    trace!(device_id = %id, "Keeping device attached during the scan");
                    continue;
                }
                if let Some(device) = state.registry.device(&id) {
                    if shared.is_still_active(&device) {
                        continue;
                    }
                }
                let (_, handle) = state.registry.untrack(&id);
                debug!(device_id = %id, "Device no longer active");
                released.extend(handle);
            }

            for tracked in discovered {
                let id = tracked.record.id.clone();
                // Cached volume of a tracked device is owned by its callback.
                if state.registry.contains(&id) {
                    continue;
                }
                if !shared.is_still_active(&tracked.device) {
                    trace!(device_id = %id, "Device left the active state during the scan");
                    continue;
                }
                let weak = Arc::downgrade(shared);
                let handler_id = id.clone();
                if let Err(e) = state.registry.track(&shared.backend, tracked, move |generation| {
                    Shared::volume_handler(weak, handler_id, generation)
                }) {
                    log_track_failure(&id, &e);
                }
            }

            for &direction in &scanned {
                let default_id = shared.default_device_id(direction);
                state.registry.set_default(direction, default_id.as_deref());
            }

            info!(devices = state.registry.len(), "Device scan complete");
            state.emit(ChangeType::Initial, AffectedDevice::None);
            released
        };

        shared.release_all(released);
        Ok(())
    }

    /// Detach every subscription, clear the registry and stop receiving
    /// endpoint notifications. Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let was_watching = {
            let mut state = shared.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            std::mem::replace(&mut state.watching, false)
        };

        if was_watching {
            if let Err(e) = shared.backend.unregister_endpoint_notifications() {
                warn!(error = %e, "Failed to unregister endpoint notifications");
            }
        }

        let handles = shared.state.lock().registry.drain();
        info!(subscriptions = handles.len(), "Shutting down endpoint manager");
        shared.release_all(handles);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Entry points for backend notifications.
    pub fn dispatcher(&self) -> NotificationDispatcher<B> {
        NotificationDispatcher::new(Arc::downgrade(&self.shared))
    }

    /// Snapshot of every tracked device, ordered by id.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.shared.state.lock().registry.snapshot()
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.shared.state.lock().registry.get(device_id).cloned()
    }

    /// The tracked device currently flagged as default for `direction`.
    pub fn default_device(&self, direction: Direction) -> Option<DeviceRecord> {
        self.devices()
            .into_iter()
            .find(|r| r.direction == direction && r.is_default)
    }

    pub fn step_volume(&self) -> f32 {
        *self.shared.step_volume.lock()
    }

    /// Number of installed volume subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.state.lock().registry.subscription_count()
    }

    /// True when every tracked device has exactly one subscription and vice versa.
    pub fn is_consistent(&self) -> bool {
        self.shared.state.lock().registry.is_consistent()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }
}

impl<B: DeviceBackend> Drop for EndpointManager<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn validate_step(step: f32) -> Result<()> {
    if step.is_finite() && step > 0.0 && step <= config::volume::MAX_PERCENT {
        Ok(())
    } else {
        Err(AudioError::InvalidArgument(format!(
            "step volume must be in (0, 100], got {step}"
        )))
    }
}

pub(crate) fn log_track_failure(device_id: &str, err: &AudioError) {
    match err {
        AudioError::AlreadyAttached { .. } => {
            error!(device_id, error = %err, "Registry consistency fault while attaching")
        }
        _ => warn!(device_id, error = %err, "Failed to attach volume subscription"),
    }
}
