//! Endpoint lookups over the Windows MMDevice API.

use crate::audio::{AudioError, AudioFormat, DeviceRole, DeviceState, Direction, EndpointInfo};
use windows::core::{Interface, PCWSTR, PWSTR};
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eMultimedia, eRender, EDataFlow, ERole, IAudioClient,
    IMMDevice, IMMDeviceEnumerator, IMMEndpoint, DEVICE_STATE, DEVICE_STATE_ACTIVE,
    WAVEFORMATEX,
};
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL, STGM};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

pub(super) fn to_flow(direction: Direction) -> EDataFlow {
    match direction {
        Direction::Render => eRender,
        Direction::Capture => eCapture,
    }
}

/// `None` for `eAll`, which never names a single endpoint.
pub(super) fn from_flow(flow: EDataFlow) -> Option<Direction> {
    if flow == eRender {
        Some(Direction::Render)
    } else if flow == eCapture {
        Some(Direction::Capture)
    } else {
        None
    }
}

pub(super) fn to_role(role: DeviceRole) -> ERole {
    match role {
        DeviceRole::Console => eConsole,
        DeviceRole::Multimedia => eMultimedia,
        DeviceRole::Communications => eCommunications,
    }
}

pub(super) fn from_role(role: ERole) -> DeviceRole {
    if role == eConsole {
        DeviceRole::Console
    } else if role == eCommunications {
        DeviceRole::Communications
    } else {
        DeviceRole::Multimedia
    }
}

pub(super) fn from_state(state: DEVICE_STATE) -> DeviceState {
    match state.0 {
        1 => DeviceState::Active,
        2 => DeviceState::Disabled,
        8 => DeviceState::Unplugged,
        _ => DeviceState::NotPresent,
    }
}

pub(super) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Copy a COM-allocated string and free it.
unsafe fn take_pwstr(p: PWSTR) -> Result<String, AudioError> {
    let result = p
        .to_string()
        .map_err(|e| AudioError::StringConversion(e.to_string()));
    CoTaskMemFree(Some(p.0 as *const _));
    result
}

pub(super) fn active_devices(
    enumerator: &IMMDeviceEnumerator,
    direction: Direction,
) -> Result<Vec<IMMDevice>, AudioError> {
    unsafe {
        let collection = enumerator
            .EnumAudioEndpoints(to_flow(direction), DEVICE_STATE_ACTIVE)
            .map_err(AudioError::backend)?;
        let count = collection.GetCount().map_err(AudioError::backend)?;

        let mut devices = Vec::with_capacity(count as usize);
        for i in 0..count {
            devices.push(collection.Item(i).map_err(AudioError::backend)?);
        }
        Ok(devices)
    }
}

/// `None` when the enumerator does not know `device_id`.
pub(super) fn device_by_id(
    enumerator: &IMMDeviceEnumerator,
    device_id: &str,
) -> Option<IMMDevice> {
    let id = wide(device_id);
    unsafe { enumerator.GetDevice(PCWSTR::from_raw(id.as_ptr())).ok() }
}

pub(super) fn default_device(
    enumerator: &IMMDeviceEnumerator,
    direction: Direction,
    role: DeviceRole,
) -> Option<IMMDevice> {
    unsafe {
        enumerator
            .GetDefaultAudioEndpoint(to_flow(direction), to_role(role))
            .ok()
    }
}

pub(super) fn device_id(device: &IMMDevice) -> Result<String, AudioError> {
    unsafe {
        let id = device.GetId().map_err(AudioError::backend)?;
        take_pwstr(id)
    }
}

pub(super) fn device_state(device: &IMMDevice) -> Result<DeviceState, AudioError> {
    let state = unsafe { device.GetState() }.map_err(AudioError::backend)?;
    Ok(from_state(state))
}

pub(super) fn describe(device: &IMMDevice) -> Result<EndpointInfo, AudioError> {
    unsafe {
        let id = device_id(device)?;
        let state = device.GetState().map_err(AudioError::backend)?;
        let endpoint: IMMEndpoint = device.cast().map_err(AudioError::backend)?;
        let flow = endpoint.GetDataFlow().map_err(AudioError::backend)?;
        let direction = from_flow(flow).ok_or_else(|| {
            AudioError::BackendUnavailable(format!("endpoint {id} reports no single data flow"))
        })?;

        let name = device
            .OpenPropertyStore(STGM(0))
            .ok()
            .and_then(|props| friendly_name(&props))
            .unwrap_or_else(|| "Unknown".to_string());

        let state = from_state(state);
        // Disabled endpoints refuse to activate an audio client.
        let format = if state.is_active() {
            mix_format(device)
        } else {
            None
        };

        Ok(EndpointInfo {
            id,
            name,
            direction,
            state,
            format,
        })
    }
}

fn friendly_name(props: &IPropertyStore) -> Option<String> {
    let key = PROPERTYKEY {
        fmtid: DEVPKEY_Device_FriendlyName.fmtid,
        pid: DEVPKEY_Device_FriendlyName.pid,
    };
    let value = unsafe { props.GetValue(&key) }.ok()?;
    let name = value.to_string();
    (!name.is_empty()).then_some(name)
}

fn mix_format(device: &IMMDevice) -> Option<AudioFormat> {
    unsafe {
        let client: IAudioClient = device.Activate(CLSCTX_ALL, None).ok()?;
        let format_ptr = client.GetMixFormat().ok()?;
        if format_ptr.is_null() {
            return None;
        }

        let format: &WAVEFORMATEX = &*format_ptr;
        let audio_format = AudioFormat {
            sample_rate: format.nSamplesPerSec,
            bit_depth: format.wBitsPerSample,
            channels: format.nChannels,
        };
        CoTaskMemFree(Some(format_ptr as *const _));

        Some(audio_format)
    }
}
