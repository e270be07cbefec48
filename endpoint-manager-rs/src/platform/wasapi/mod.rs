//! Windows Core Audio backend.
//!
//! Talks to the MMDevice API: endpoint enumeration through
//! `IMMDeviceEnumerator`, volume through `IAudioEndpointVolume`, and hot-plug
//! and default changes through `IMMNotificationClient`. Callbacks arrive on
//! threads owned by the audio service.

mod endpoint;
mod notifications;
mod volume;

pub use volume::VolumeRegistration;

use crate::audio::{
    AudioError, DeviceBackend, DeviceRole, DeviceState, Direction, EndpointInfo, NotificationSink,
    VolumeHandler, VolumeState,
};
use notifications::EndpointNotificationClient;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use volume::VolumeController;
use windows::Win32::Media::Audio::{IMMDevice, IMMDeviceEnumerator, IMMNotificationClient, MMDeviceEnumerator};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED,
};

/// COM initialization guard that uninitializes COM on drop.
///
/// Initializes the multithreaded apartment, so every thread in the process
/// can use the backend. Keep it alive on the initializing thread for as long
/// as the backend is in use.
pub struct ComGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| AudioError::BackendUnavailable(format!("COM initialization failed: {e}")))?;
        }
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Native endpoint handle.
#[derive(Clone)]
pub struct WasapiDevice {
    device: IMMDevice,
}

// MMDevice objects are free-threaded.
unsafe impl Send for WasapiDevice {}
unsafe impl Sync for WasapiDevice {}

/// Backend over the Windows MMDevice API.
pub struct WasapiBackend {
    enumerator: IMMDeviceEnumerator,
    client: Mutex<Option<IMMNotificationClient>>,
}

unsafe impl Send for WasapiBackend {}
unsafe impl Sync for WasapiBackend {}

impl WasapiBackend {
    /// Create the device enumerator. COM must already be initialized.
    pub fn new() -> Result<Self, AudioError> {
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .map_err(|e| AudioError::BackendUnavailable(format!("device enumerator: {e}")))?;

        Ok(Self {
            enumerator,
            client: Mutex::new(None),
        })
    }
}

impl DeviceBackend for WasapiBackend {
    type Device = WasapiDevice;
    type Subscription = VolumeRegistration;

    fn enumerate_active_devices(&self, direction: Direction) -> Result<Vec<WasapiDevice>, AudioError> {
        Ok(endpoint::active_devices(&self.enumerator, direction)?
            .into_iter()
            .map(|device| WasapiDevice { device })
            .collect())
    }

    fn get_device(&self, device_id: &str) -> Result<Option<WasapiDevice>, AudioError> {
        Ok(endpoint::device_by_id(&self.enumerator, device_id).map(|device| WasapiDevice { device }))
    }

    fn get_default_device(
        &self,
        direction: Direction,
        role: DeviceRole,
    ) -> Result<Option<WasapiDevice>, AudioError> {
        Ok(endpoint::default_device(&self.enumerator, direction, role)
            .map(|device| WasapiDevice { device }))
    }

    fn device_id(&self, device: &WasapiDevice) -> Result<String, AudioError> {
        endpoint::device_id(&device.device)
    }

    fn describe(&self, device: &WasapiDevice) -> Result<EndpointInfo, AudioError> {
        endpoint::describe(&device.device)
    }

    fn device_state(&self, device: &WasapiDevice) -> Result<DeviceState, AudioError> {
        endpoint::device_state(&device.device)
    }

    fn read_volume(&self, device: &WasapiDevice) -> Result<VolumeState, AudioError> {
        VolumeController::new(&device.device)?.read()
    }

    fn write_volume(&self, device: &WasapiDevice, percent: f32) -> Result<(), AudioError> {
        VolumeController::new(&device.device)?.set_volume(percent)
    }

    fn write_mute(&self, device: &WasapiDevice, muted: bool) -> Result<(), AudioError> {
        VolumeController::new(&device.device)?.set_mute(muted)
    }

    fn subscribe_volume(
        &self,
        device: &WasapiDevice,
        handler: VolumeHandler,
    ) -> Result<VolumeRegistration, AudioError> {
        VolumeController::new(&device.device)?.subscribe(handler)
    }

    fn unsubscribe_volume(&self, subscription: VolumeRegistration) -> Result<(), AudioError> {
        subscription.unregister()
    }

    fn register_endpoint_notifications(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(), AudioError> {
        let mut client = self.client.lock();
        if client.is_some() {
            return Ok(());
        }

        let callback: IMMNotificationClient = EndpointNotificationClient::new(sink).into();
        unsafe {
            self.enumerator
                .RegisterEndpointNotificationCallback(&callback)
                .map_err(AudioError::backend)?;
        }
        debug!("Endpoint notification client registered");
        *client = Some(callback);
        Ok(())
    }

    fn unregister_endpoint_notifications(&self) -> Result<(), AudioError> {
        let Some(callback) = self.client.lock().take() else {
            return Ok(());
        };
        unsafe {
            self.enumerator
                .UnregisterEndpointNotificationCallback(&callback)
                .map_err(AudioError::backend)
        }
    }
}

impl Drop for WasapiBackend {
    fn drop(&mut self) {
        if let Err(e) = self.unregister_endpoint_notifications() {
            tracing::warn!(error = %e, "Failed to unregister endpoint notifications");
        }
    }
}
