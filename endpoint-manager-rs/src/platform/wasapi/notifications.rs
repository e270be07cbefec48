//! Endpoint notifications via IMMNotificationClient.

use super::endpoint::{from_flow, from_role, from_state};
use crate::audio::{DeviceEvent, NotificationSink};
use std::sync::Arc;
use tracing::trace;
use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::{
    EDataFlow, ERole, IMMNotificationClient, IMMNotificationClient_Impl, DEVICE_STATE,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
#[allow(unused_imports)]
use windows_core;

/// Forwards MMDevice notifications to a [`NotificationSink`].
#[implement(IMMNotificationClient)]
pub(super) struct EndpointNotificationClient {
    sink: Arc<dyn NotificationSink>,
}

impl EndpointNotificationClient {
    pub(super) fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

unsafe fn read_id(id: &PCWSTR) -> Option<String> {
    if id.is_null() {
        None
    } else {
        id.to_string().ok()
    }
}

impl IMMNotificationClient_Impl for EndpointNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        if let Some(device_id) = unsafe { read_id(pwstrdeviceid) } {
            self.sink.notify(DeviceEvent::DeviceStateChanged {
                device_id,
                new_state: from_state(dwnewstate),
            });
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(device_id) = unsafe { read_id(pwstrdeviceid) } {
            self.sink.notify(DeviceEvent::DeviceAdded { device_id });
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(device_id) = unsafe { read_id(pwstrdeviceid) } {
            self.sink.notify(DeviceEvent::DeviceRemoved { device_id });
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        let Some(direction) = from_flow(flow) else {
            trace!(flow = flow.0, "Ignoring default change without a single data flow");
            return Ok(());
        };
        self.sink.notify(DeviceEvent::DefaultDeviceChanged {
            direction,
            role: from_role(role),
            device_id: unsafe { read_id(pwstrdefaultdeviceid) },
        });
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        if let Some(device_id) = unsafe { read_id(pwstrdeviceid) } {
            self.sink.notify(DeviceEvent::PropertyValueChanged { device_id });
        }
        Ok(())
    }
}
