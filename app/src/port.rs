#![allow(async_fn_in_trait)]

use anyhow::Result;

use crate::sensor::{DeviceStateChange, DeviceTarget, PollResult, SensorEntity};

/// Read access to the host's view of a polled device.
pub trait DeviceStateAccess {
    /// `None` if the host does not know the entity.
    async fn device_target(&self, entity_id: &str) -> Result<Option<DeviceTarget>>;

    async fn adb_response(&self, entity_id: &str) -> Result<Option<String>> {
        Ok(self.device_target(entity_id).await?.and_then(|device| device.adb_response))
    }
}

/// Fire-and-forget command channel to the device. Completion is only observable through
/// the device's `adb_response` attribute.
pub trait CommandTransport {
    async fn dispatch(&self, entity_id: &str, command: &str) -> Result<()>;
}

pub trait SensorStatePublisher {
    async fn publish(&self, entity: &SensorEntity, result: &PollResult) -> Result<()>;
}

pub trait DeviceStateEvents {
    /// Next state change of any entity; `None` once the event stream is closed.
    async fn recv(&mut self) -> Option<DeviceStateChange>;
}
