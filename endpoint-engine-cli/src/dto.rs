//! JSON shapes written to stdout.

use endpoint_manager_rs::audio::{AffectedDevice, ChangeEvent, DeviceRecord};
use serde::Serialize;

/// A device with its cached state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub id: String,
    pub name: String,
    pub data_flow: String,
    pub is_default: bool,
    pub volume: u8,
    pub is_muted: bool,
    pub channels: u16,
    pub bit_depth: u16,
    pub sample_rate: u32,
}

impl From<&DeviceRecord> for DeviceDto {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            data_flow: record.direction.to_string(),
            is_default: record.is_default,
            volume: record.volume_percent,
            is_muted: record.is_muted,
            channels: record.channels,
            bit_depth: record.bit_depth,
            sample_rate: record.sample_rate_hz,
        }
    }
}

/// The device an action refers to: a full snapshot, or just its id
/// (`null` when no single device is involved).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ActionDevice {
    Device(DeviceDto),
    Id { id: Option<String> },
}

#[derive(Debug, Serialize)]
pub struct ActionDto {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub device: ActionDevice,
}

/// `{"action": {"type": ..., "device": ...}, "devices": [...]}`
#[derive(Debug, Serialize)]
pub struct ChangeDto {
    pub action: ActionDto,
    pub devices: Vec<DeviceDto>,
}

impl From<&ChangeEvent> for ChangeDto {
    fn from(event: &ChangeEvent) -> Self {
        let device = match &event.affected {
            AffectedDevice::Device(record) => ActionDevice::Device(record.into()),
            AffectedDevice::Id(id) => ActionDevice::Id {
                id: Some(id.clone()),
            },
            AffectedDevice::None => ActionDevice::Id { id: None },
        };
        Self {
            action: ActionDto {
                kind: event.change_type.as_str(),
                device,
            },
            devices: event.devices.iter().map(Into::into).collect(),
        }
    }
}

/// Response to `list`.
#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceDto>,
}

impl DeviceListResponse {
    pub fn new(records: &[DeviceRecord]) -> Self {
        Self {
            devices: records.iter().map(Into::into).collect(),
        }
    }
}
