//! Endpoint volume control and change callbacks via IAudioEndpointVolume.

use crate::audio::{AudioError, VolumeHandler, VolumeState};
use windows::Win32::Media::Audio::Endpoints::{
    IAudioEndpointVolume, IAudioEndpointVolumeCallback, IAudioEndpointVolumeCallback_Impl,
};
use windows::Win32::Media::Audio::{IMMDevice, AUDIO_VOLUME_NOTIFICATION_DATA};
use windows::Win32::System::Com::CLSCTX_ALL;
use windows::core::implement;
#[allow(unused_imports)]
use windows_core;

/// Master volume and mute of one endpoint.
pub(super) struct VolumeController {
    endpoint_volume: IAudioEndpointVolume,
}

impl VolumeController {
    pub(super) fn new(device: &IMMDevice) -> Result<Self, AudioError> {
        let endpoint_volume: IAudioEndpointVolume = unsafe { device.Activate(CLSCTX_ALL, None) }
            .map_err(|e| AudioError::BackendUnavailable(format!("endpoint volume: {e}")))?;
        Ok(Self { endpoint_volume })
    }

    pub(super) fn read(&self) -> Result<VolumeState, AudioError> {
        unsafe {
            let level = self
                .endpoint_volume
                .GetMasterVolumeLevelScalar()
                .map_err(AudioError::backend)?;
            let muted = self.endpoint_volume.GetMute().map_err(AudioError::backend)?;
            Ok(VolumeState::new(level * 100.0, muted.as_bool()))
        }
    }

    /// `percent` is 0.0 to 100.0.
    pub(super) fn set_volume(&self, percent: f32) -> Result<(), AudioError> {
        let level = (percent / 100.0).clamp(0.0, 1.0);
        unsafe {
            self.endpoint_volume
                .SetMasterVolumeLevelScalar(level, std::ptr::null())
                .map_err(AudioError::backend)
        }
    }

    pub(super) fn set_mute(&self, muted: bool) -> Result<(), AudioError> {
        unsafe {
            self.endpoint_volume
                .SetMute(muted, std::ptr::null())
                .map_err(AudioError::backend)
        }
    }

    /// Install `handler`; the returned registration must be passed to
    /// [`VolumeRegistration::unregister`].
    pub(super) fn subscribe(self, handler: VolumeHandler) -> Result<VolumeRegistration, AudioError> {
        let callback: IAudioEndpointVolumeCallback = VolumeCallback { handler }.into();
        unsafe {
            self.endpoint_volume
                .RegisterControlChangeNotify(&callback)
                .map_err(AudioError::backend)?;
        }
        Ok(VolumeRegistration {
            endpoint_volume: self.endpoint_volume,
            callback,
        })
    }
}

/// A registered volume callback.
pub struct VolumeRegistration {
    endpoint_volume: IAudioEndpointVolume,
    callback: IAudioEndpointVolumeCallback,
}

// Endpoint volume objects are free-threaded.
unsafe impl Send for VolumeRegistration {}

impl VolumeRegistration {
    /// Blocks until an in-flight callback returns.
    pub(super) fn unregister(self) -> Result<(), AudioError> {
        unsafe {
            self.endpoint_volume
                .UnregisterControlChangeNotify(&self.callback)
                .map_err(AudioError::backend)
        }
    }
}

#[implement(IAudioEndpointVolumeCallback)]
struct VolumeCallback {
    handler: VolumeHandler,
}

impl IAudioEndpointVolumeCallback_Impl for VolumeCallback_Impl {
    fn OnNotify(&self, pnotify: *mut AUDIO_VOLUME_NOTIFICATION_DATA) -> windows::core::Result<()> {
        if let Some(data) = unsafe { pnotify.as_ref() } {
            (self.handler)(VolumeState::new(
                data.fMasterVolume * 100.0,
                data.bMuted.as_bool(),
            ));
        }
        Ok(())
    }
}
