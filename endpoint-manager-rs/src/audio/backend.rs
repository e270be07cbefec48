//! Device backend abstraction.
//!
//! A backend enumerates endpoints, reads and writes their volume, and
//! delivers notifications. The registry treats it as a black box that may
//! fail, may call back on any thread, and may report ids that no longer exist.

use super::device::{
    AudioError, DeviceEvent, DeviceRole, DeviceState, Direction, EndpointInfo, VolumeState,
};
use std::sync::Arc;

/// Callback installed on one endpoint; invoked with the new volume state.
pub type VolumeHandler = Box<dyn Fn(VolumeState) + Send + Sync + 'static>;

/// Receiver of endpoint-level notifications (added, removed, default changed, ...).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: DeviceEvent);
}

/// Capability to enumerate and control audio endpoints.
///
/// Re-entrancy contract: `subscribe_volume` and `unsubscribe_volume` must not
/// invoke a volume handler synchronously on the calling thread. They may,
/// however, block until in-flight handlers on other threads return.
/// `write_volume` and `write_mute` may invoke the affected device's handler
/// synchronously before returning. Registering or unregistering endpoint
/// notifications must not deliver a notification on the calling thread.
pub trait DeviceBackend: Send + Sync + 'static {
    /// Native endpoint handle.
    type Device: Clone + Send + Sync + 'static;

    /// Native volume-change registration. Owned by exactly one subscription handle.
    type Subscription: Send + 'static;

    /// All active endpoints for a direction.
    fn enumerate_active_devices(&self, direction: Direction) -> Result<Vec<Self::Device>, AudioError>;

    /// Look up an endpoint by id, in any state. `Ok(None)` if the backend does not know it.
    fn get_device(&self, device_id: &str) -> Result<Option<Self::Device>, AudioError>;

    /// Current OS default endpoint for a direction and role.
    fn get_default_device(
        &self,
        direction: Direction,
        role: DeviceRole,
    ) -> Result<Option<Self::Device>, AudioError>;

    /// Id of a native endpoint handle.
    fn device_id(&self, device: &Self::Device) -> Result<String, AudioError>;

    /// Name, direction, state and mix format of an endpoint.
    fn describe(&self, device: &Self::Device) -> Result<EndpointInfo, AudioError>;

    /// Current state of an endpoint. Cheaper than `describe`.
    fn device_state(&self, device: &Self::Device) -> Result<DeviceState, AudioError>;

    fn read_volume(&self, device: &Self::Device) -> Result<VolumeState, AudioError>;

    /// Set the master volume, in percent (0.0 to 100.0).
    fn write_volume(&self, device: &Self::Device, percent: f32) -> Result<(), AudioError>;

    fn write_mute(&self, device: &Self::Device, muted: bool) -> Result<(), AudioError>;

    /// Install a volume-change callback on one endpoint.
    fn subscribe_volume(
        &self,
        device: &Self::Device,
        handler: VolumeHandler,
    ) -> Result<Self::Subscription, AudioError>;

    /// Remove a callback previously returned by `subscribe_volume`.
    fn unsubscribe_volume(&self, subscription: Self::Subscription) -> Result<(), AudioError>;

    /// Start delivering endpoint notifications to `sink`.
    fn register_endpoint_notifications(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(), AudioError>;

    /// Stop delivering endpoint notifications. No-op if none are registered.
    fn unregister_endpoint_notifications(&self) -> Result<(), AudioError>;
}
