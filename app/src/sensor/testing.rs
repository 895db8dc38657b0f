use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use crate::port::{CommandTransport, DeviceStateAccess, SensorStatePublisher};

use super::{DeviceTarget, PollResult, Reachability, SensorEntity};

#[derive(Clone)]
pub struct FakeDevice {
    inner: Arc<Mutex<FakeDeviceState>>,
}

struct FakeDeviceState {
    target: Option<DeviceTarget>,
    fail_reads: bool,
}

impl FakeDevice {
    pub fn available(entity_id: &str) -> Self {
        Self::with_state(entity_id, "on")
    }

    pub fn with_state(entity_id: &str, state: &str) -> Self {
        Self::new(Some(DeviceTarget {
            entity_id: entity_id.to_string(),
            reachability: Reachability::from_state(state),
            adb_response: None,
        }))
    }

    pub fn missing() -> Self {
        Self::new(None)
    }

    fn new(target: Option<DeviceTarget>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeDeviceState {
                target,
                fail_reads: false,
            })),
        }
    }

    pub fn failing_reads(self) -> Self {
        self.inner.lock().unwrap().fail_reads = true;
        self
    }

    pub fn set_state(&self, state: &str) {
        if let Some(target) = self.inner.lock().unwrap().target.as_mut() {
            target.reachability = Reachability::from_state(state);
        }
    }

    pub fn set_output(&self, output: Option<&str>) {
        if let Some(target) = self.inner.lock().unwrap().target.as_mut() {
            target.adb_response = output.map(str::to_string);
        }
    }
}

impl DeviceStateAccess for FakeDevice {
    async fn device_target(&self, entity_id: &str) -> Result<Option<DeviceTarget>> {
        let state = self.inner.lock().unwrap();
        if state.fail_reads {
            bail!("Home Assistant not reachable");
        }

        Ok(state.target.clone().filter(|t| t.entity_id == entity_id))
    }
}

/// Sets the device output according to the configured replies. Commands without reply
/// produce a generic acknowledgement.
#[derive(Clone)]
pub struct FakeTransport {
    device: FakeDevice,
    replies: HashMap<String, Option<String>>,
    failing_at: Option<usize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn replying(device: &FakeDevice, replies: &[(&str, Option<&str>)]) -> Self {
        Self {
            device: device.clone(),
            replies: replies
                .iter()
                .map(|(cmd, reply)| (cmd.to_string(), reply.map(str::to_string)))
                .collect(),
            failing_at: None,
            calls: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn failing_at(mut self, call: usize) -> Self {
        self.failing_at = Some(call);
        self
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandTransport for FakeTransport {
    async fn dispatch(&self, _entity_id: &str, command: &str) -> Result<()> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(command.to_string());
            calls.len() - 1
        };

        if self.failing_at == Some(index) {
            bail!("ADB connection refused");
        }

        match self.replies.get(command) {
            Some(reply) => self.device.set_output(reply.as_deref()),
            None => self.device.set_output(Some(&format!("{command}: done"))),
        }

        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakePublisher {
    published: Arc<Mutex<Vec<(String, PollResult)>>>,
    failing: bool,
}

impl FakePublisher {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, PollResult)> {
        self.published.lock().unwrap().clone()
    }
}

impl SensorStatePublisher for FakePublisher {
    async fn publish(&self, entity: &SensorEntity, result: &PollResult) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((entity.sensor_entity_id.clone(), result.clone()));

        if self.failing {
            bail!("Home Assistant rejected state");
        }

        Ok(())
    }
}
