//! In-process device backend.
//!
//! Simulates the OS endpoint feed: devices can be plugged, unplugged,
//! disabled, made default, or have their hardware volume changed. Callbacks
//! are delivered either synchronously on the calling thread or from a
//! background notification thread. Every write and subscription call is
//! recorded so tests can inspect what the registry asked of the hardware.

use super::backend::{DeviceBackend, NotificationSink, VolumeHandler};
use super::device::{
    AudioError, AudioFormat, DeviceEvent, DeviceRole, DeviceState, Direction, EndpointInfo,
    VolumeState,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::trace;

/// How callbacks reach the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// On the thread that caused the change, before the call returns
    Synchronous,

    /// On a dedicated notification thread, in order
    Background,
}

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Enumerate,
    Describe,
    DefaultDevice,
    ReadVolume,
    WriteVolume,
    WriteMute,
    Subscribe,
    RegisterNotifications,
}

/// A hardware write observed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    Volume { device_id: String, percent: f32 },
    Mute { device_id: String, muted: bool },
}

/// Native handle of a simulated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDevice {
    id: String,
}

impl MemoryDevice {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Token returned by `subscribe_volume`.
#[derive(Debug)]
pub struct MemorySubscription {
    token: u64,
}

struct SimulatedEndpoint {
    info: EndpointInfo,
    volume: VolumeState,
}

struct InstalledHandler {
    device_id: String,
    handler: Arc<VolumeHandler>,
}

type Job = Box<dyn FnOnce() + Send>;
type UnsubscribeHook = Arc<dyn Fn(&str) + Send + Sync>;
type ReadHook = Arc<dyn Fn(&MemoryBackend, &str) + Send + Sync>;

#[derive(Default)]
struct State {
    endpoints: HashMap<String, SimulatedEndpoint>,
    defaults: HashMap<(Direction, DeviceRole), String>,
    handlers: HashMap<u64, InstalledHandler>,
    next_token: u64,
    sink: Option<Arc<dyn NotificationSink>>,
    failing: HashSet<FailPoint>,
    writes: Vec<WriteRecord>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    unsubscribe_hook: Option<UnsubscribeHook>,
    read_hook: Option<ReadHook>,
}

/// Simulated endpoint feed.
pub struct MemoryBackend {
    state: Mutex<State>,
    delivery: Delivery,
    worker: Mutex<Option<(Sender<Job>, JoinHandle<()>)>>,
}

impl MemoryBackend {
    /// Backend that delivers callbacks synchronously.
    pub fn new() -> Self {
        Self::with_delivery(Delivery::Synchronous)
    }

    pub fn with_delivery(delivery: Delivery) -> Self {
        let worker = match delivery {
            Delivery::Synchronous => None,
            Delivery::Background => {
                let (tx, rx) = mpsc::channel::<Job>();
                let handle = std::thread::Builder::new()
                    .name("memory-backend-notify".to_string())
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                    })
                    .ok();
                handle.map(|h| (tx, h))
            }
        };

        Self {
            state: Mutex::new(State::default()),
            delivery,
            worker: Mutex::new(worker),
        }
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Add an active endpoint without notifying anyone (initial hardware state).
    pub fn add_device(&self, id: &str, name: &str, direction: Direction) {
        let mut state = self.state.lock();
        state.endpoints.insert(
            id.to_string(),
            SimulatedEndpoint {
                info: EndpointInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    direction,
                    state: DeviceState::Active,
                    format: Some(AudioFormat {
                        sample_rate: 48000,
                        bit_depth: 24,
                        channels: 2,
                    }),
                },
                volume: VolumeState::new(50.0, false),
            },
        );
    }

    /// Plug in a new endpoint and announce it.
    pub fn connect_device(&self, id: &str, name: &str, direction: Direction) {
        self.add_device(id, name, direction);
        self.notify(DeviceEvent::DeviceAdded {
            device_id: id.to_string(),
        });
    }

    /// Forget an endpoint entirely and announce the removal.
    pub fn remove_device(&self, id: &str) {
        {
            let mut state = self.state.lock();
            state.endpoints.remove(id);
            state.defaults.retain(|_, default_id| default_id != id);
        }
        self.notify(DeviceEvent::DeviceRemoved {
            device_id: id.to_string(),
        });
    }

    /// Change an endpoint's state and announce it.
    pub fn set_state(&self, id: &str, new_state: DeviceState) {
        {
            let mut state = self.state.lock();
            if let Some(endpoint) = state.endpoints.get_mut(id) {
                endpoint.info.state = new_state;
            }
        }
        self.notify(DeviceEvent::DeviceStateChanged {
            device_id: id.to_string(),
            new_state,
        });
    }

    /// Set the default endpoint silently (initial hardware state).
    pub fn set_default_silently(&self, direction: Direction, role: DeviceRole, id: Option<&str>) {
        let mut state = self.state.lock();
        match id {
            Some(id) => {
                state.defaults.insert((direction, role), id.to_string());
            }
            None => {
                state.defaults.remove(&(direction, role));
            }
        }
    }

    /// Change the default endpoint and announce it.
    pub fn set_default(&self, direction: Direction, role: DeviceRole, id: Option<&str>) {
        self.set_default_silently(direction, role, id);
        self.notify(DeviceEvent::DefaultDeviceChanged {
            direction,
            role,
            device_id: id.map(str::to_string),
        });
    }

    /// Set hardware volume without firing callbacks (initial hardware state).
    pub fn set_volume_silently(&self, id: &str, volume: VolumeState) {
        if let Some(endpoint) = self.state.lock().endpoints.get_mut(id) {
            endpoint.volume = volume;
        }
    }

    /// Change hardware volume as if the user moved a slider elsewhere.
    pub fn set_hardware_volume(&self, id: &str, volume: VolumeState) {
        self.set_volume_silently(id, volume);
        self.fire_volume(id, volume);
    }

    /// Deliver a raw notification to the registered sink.
    pub fn notify(&self, event: DeviceEvent) {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => self.deliver(move || sink.notify(event)),
            None => trace!(?event, "No notification sink registered, dropping event"),
        }
    }

    /// Invoke every handler installed on `id` with `volume`, whether or not
    /// the hardware value changed.
    pub fn fire_volume(&self, id: &str, volume: VolumeState) {
        let handlers: Vec<Arc<VolumeHandler>> = self
            .state
            .lock()
            .handlers
            .values()
            .filter(|h| h.device_id == id)
            .map(|h| Arc::clone(&h.handler))
            .collect();

        for handler in handlers {
            self.deliver(move || handler(volume));
        }
    }

    /// Wait until every queued background callback has run.
    pub fn flush(&self) {
        let sender = self.worker.lock().as_ref().map(|(tx, _)| tx.clone());
        if let Some(sender) = sender {
            let (done_tx, done_rx) = mpsc::channel();
            if sender
                .send(Box::new(move || {
                    let _ = done_tx.send(());
                }))
                .is_ok()
            {
                let _ = done_rx.recv();
            }
        }
    }

    pub fn set_failing(&self, point: FailPoint, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(point);
        } else {
            state.failing.remove(&point);
        }
    }

    /// Run `hook` with the device id on every `unsubscribe_volume` call.
    pub fn set_unsubscribe_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.state.lock().unsubscribe_hook = Some(Arc::new(hook));
    }

    /// Run `hook` with the backend and the device id at the start of every
    /// `read_volume` call, before the read takes effect.
    pub fn set_read_volume_hook(
        &self,
        hook: impl Fn(&MemoryBackend, &str) + Send + Sync + 'static,
    ) {
        self.state.lock().read_hook = Some(Arc::new(hook));
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn hardware_volume(&self, id: &str) -> Option<VolumeState> {
        self.state.lock().endpoints.get(id).map(|e| e.volume)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unsubscribe_calls
    }

    /// Number of callbacks currently installed on `id`.
    pub fn active_subscriptions(&self, id: &str) -> usize {
        self.state
            .lock()
            .handlers
            .values()
            .filter(|h| h.device_id == id)
            .count()
    }

    pub fn total_active_subscriptions(&self) -> usize {
        self.state.lock().handlers.len()
    }

    pub fn has_notification_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    fn deliver(&self, job: impl FnOnce() + Send + 'static) {
        match self.delivery {
            Delivery::Synchronous => job(),
            Delivery::Background => {
                let sender = self.worker.lock().as_ref().map(|(tx, _)| tx.clone());
                match sender {
                    Some(sender) => {
                        if let Err(mpsc::SendError(job)) = sender.send(Box::new(job)) {
                            job();
                        }
                    }
                    None => job(),
                }
            }
        }
    }

    fn check(&self, state: &State, point: FailPoint) -> Result<(), AudioError> {
        if state.failing.contains(&point) {
            Err(AudioError::BackendUnavailable(format!(
                "simulated {point:?} failure"
            )))
        } else {
            Ok(())
        }
    }

    fn record_write(&self, device: &MemoryDevice, write: WriteRecord, volume: VolumeState) -> Result<(), AudioError> {
        {
            let mut state = self.state.lock();
            let endpoint = state
                .endpoints
                .get_mut(&device.id)
                .ok_or_else(|| AudioError::DeviceNotFound {
                    device_id: device.id.clone(),
                })?;
            endpoint.volume = volume;
            state.writes.push(write);
        }
        // Hardware echoes every write back through the endpoint's callbacks.
        self.fire_volume(&device.id, volume);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        if let Some((sender, handle)) = self.worker.lock().take() {
            drop(sender);
            // The last reference can be released by a job on the worker itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl DeviceBackend for MemoryBackend {
    type Device = MemoryDevice;
    type Subscription = MemorySubscription;

    fn enumerate_active_devices(&self, direction: Direction) -> Result<Vec<MemoryDevice>, AudioError> {
        let state = self.state.lock();
        self.check(&state, FailPoint::Enumerate)?;
        let mut devices: Vec<MemoryDevice> = state
            .endpoints
            .values()
            .filter(|e| e.info.direction == direction && e.info.state.is_active())
            .map(|e| MemoryDevice {
                id: e.info.id.clone(),
            })
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }

    fn get_device(&self, device_id: &str) -> Result<Option<MemoryDevice>, AudioError> {
        let state = self.state.lock();
        Ok(state.endpoints.get(device_id).map(|_| MemoryDevice {
            id: device_id.to_string(),
        }))
    }

    fn get_default_device(
        &self,
        direction: Direction,
        role: DeviceRole,
    ) -> Result<Option<MemoryDevice>, AudioError> {
        let state = self.state.lock();
        self.check(&state, FailPoint::DefaultDevice)?;
        Ok(state
            .defaults
            .get(&(direction, role))
            .filter(|id| state.endpoints.contains_key(*id))
            .map(|id| MemoryDevice { id: id.clone() }))
    }

    fn device_id(&self, device: &MemoryDevice) -> Result<String, AudioError> {
        Ok(device.id.clone())
    }

    fn describe(&self, device: &MemoryDevice) -> Result<EndpointInfo, AudioError> {
        let state = self.state.lock();
        self.check(&state, FailPoint::Describe)?;
        state
            .endpoints
            .get(&device.id)
            .map(|e| e.info.clone())
            .ok_or_else(|| AudioError::DeviceNotFound {
                device_id: device.id.clone(),
            })
    }

    fn device_state(&self, device: &MemoryDevice) -> Result<DeviceState, AudioError> {
        Ok(self
            .state
            .lock()
            .endpoints
            .get(&device.id)
            .map(|e| e.info.state)
            .unwrap_or(DeviceState::NotPresent))
    }

    fn read_volume(&self, device: &MemoryDevice) -> Result<VolumeState, AudioError> {
        let hook = self.state.lock().read_hook.clone();
        if let Some(hook) = hook {
            hook(self, &device.id);
        }
        let state = self.state.lock();
        self.check(&state, FailPoint::ReadVolume)?;
        state
            .endpoints
            .get(&device.id)
            .map(|e| e.volume)
            .ok_or_else(|| AudioError::DeviceNotFound {
                device_id: device.id.clone(),
            })
    }

    fn write_volume(&self, device: &MemoryDevice, percent: f32) -> Result<(), AudioError> {
        let muted = {
            let state = self.state.lock();
            self.check(&state, FailPoint::WriteVolume)?;
            state
                .endpoints
                .get(&device.id)
                .map(|e| e.volume.muted)
                .unwrap_or(false)
        };
        self.record_write(
            device,
            WriteRecord::Volume {
                device_id: device.id.clone(),
                percent,
            },
            VolumeState::new(percent, muted),
        )
    }

    fn write_mute(&self, device: &MemoryDevice, muted: bool) -> Result<(), AudioError> {
        let percent = {
            let state = self.state.lock();
            self.check(&state, FailPoint::WriteMute)?;
            state
                .endpoints
                .get(&device.id)
                .map(|e| e.volume.percent)
                .unwrap_or(0.0)
        };
        self.record_write(
            device,
            WriteRecord::Mute {
                device_id: device.id.clone(),
                muted,
            },
            VolumeState::new(percent, muted),
        )
    }

    fn subscribe_volume(
        &self,
        device: &MemoryDevice,
        handler: VolumeHandler,
    ) -> Result<MemorySubscription, AudioError> {
        let mut state = self.state.lock();
        state.subscribe_calls += 1;
        self.check(&state, FailPoint::Subscribe)?;
        if !state.endpoints.contains_key(&device.id) {
            return Err(AudioError::DeviceNotFound {
                device_id: device.id.clone(),
            });
        }
        state.next_token += 1;
        let token = state.next_token;
        state.handlers.insert(
            token,
            InstalledHandler {
                device_id: device.id.clone(),
                handler: Arc::new(handler),
            },
        );
        Ok(MemorySubscription { token })
    }

    fn unsubscribe_volume(&self, subscription: MemorySubscription) -> Result<(), AudioError> {
        let (removed, hook) = {
            let mut state = self.state.lock();
            state.unsubscribe_calls += 1;
            let removed = state.handlers.remove(&subscription.token);
            (removed, state.unsubscribe_hook.clone())
        };
        let removed = removed.ok_or_else(|| {
            AudioError::BackendUnavailable(format!(
                "unknown subscription token {}",
                subscription.token
            ))
        })?;
        if let Some(hook) = hook {
            hook(&removed.device_id);
        }
        Ok(())
    }

    fn register_endpoint_notifications(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        self.check(&state, FailPoint::RegisterNotifications)?;
        state.sink = Some(sink);
        Ok(())
    }

    fn unregister_endpoint_notifications(&self) -> Result<(), AudioError> {
        self.state.lock().sink = None;
        Ok(())
    }
}
