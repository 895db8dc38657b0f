mod binding;
pub mod config;
mod domain;
mod poll;
mod schedule;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::OptionFuture;
use infrastructure::meter;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval};

use crate::port::{CommandTransport, DeviceStateAccess, DeviceStateEvents, SensorStatePublisher};

pub use binding::{SensorBinding, SensorEntity};
pub use domain::*;
pub use poll::{PollCycle, SettleMode, SettlePolicy};
pub use schedule::{RefreshSchedule, RefreshTrigger};

pub(crate) use schedule::refresh_channel;
use schedule::RefreshQueue;

/// State change of a host entity, as far as it matters for refreshing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStateChange {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

impl DeviceStateChange {
    //attribute updates keep the state value
    pub fn is_state_transition(&self) -> bool {
        self.old_state != self.new_state
    }
}

/// Validated configuration of one sensor.
#[derive(Debug, Clone)]
pub struct SensorDefinition {
    pub entity: SensorEntity,
    pub schedule: RefreshSchedule,
    pub commands: Vec<CommandSpec>,
}

/// Serializes poll cycles per device. Sensors sharing a device share its lock.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl DeviceLocks {
    pub fn lock_for(&mut self, device_entity_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(device_entity_id.to_string()).or_default().clone()
    }
}

/// Drives all refreshes of one sensor. Cycles hold the device lock, so they never overlap with
/// cycles of other sensors on the same device.
pub struct SensorRunner<D, T, P> {
    binding: SensorBinding,
    device_lock: Arc<Mutex<()>>,
    schedule: RefreshSchedule,
    commands: Vec<CommandSpec>,
    queue: RefreshQueue,
    devices: D,
    transport: T,
    publisher: P,
    settle: SettlePolicy,
}

impl<D, T, P> SensorRunner<D, T, P>
where
    D: DeviceStateAccess,
    T: CommandTransport,
    P: SensorStatePublisher,
{
    /// Completes and publishes the first cycle, so the sensor never shows up without a state.
    pub async fn start(
        definition: SensorDefinition,
        device_lock: Arc<Mutex<()>>,
        devices: D,
        transport: T,
        publisher: P,
        settle: SettlePolicy,
    ) -> Self {
        let (handle, queue) = refresh_channel();

        let runner = Self {
            binding: SensorBinding::new(definition.entity, handle),
            device_lock,
            schedule: definition.schedule,
            commands: definition.commands,
            queue,
            devices,
            transport,
            publisher,
            settle,
        };

        runner.refresh(RefreshTrigger::Startup).await;
        runner
    }

    pub fn binding(&self) -> SensorBinding {
        self.binding.clone()
    }

    pub async fn run(mut self) {
        let mut timer = self.schedule.timer();

        tracing::info!(
            "Starting refresh loop of {} with scan interval of {:?}",
            self.binding.entity().name,
            self.schedule.interval
        );

        loop {
            let trigger = tokio::select! {
                Some(_) = OptionFuture::from(timer.as_mut().map(Interval::tick)) => RefreshTrigger::Timer,
                trigger = self.queue.recv() => trigger,
            };

            //served by the cycle about to start
            if let Some(pending) = self.queue.clear() {
                tracing::debug!("Merging pending refresh from {} into {}", pending, trigger);
            }

            self.refresh(trigger).await;

            if let Some(timer) = timer.as_mut() {
                timer.reset();
            }
        }
    }

    async fn refresh(&self, trigger: RefreshTrigger) {
        let entity = self.binding.entity();
        tracing::info!("Refreshing {} (trigger: {})", entity.name, trigger);

        let result = {
            let _device = self.device_lock.lock().await;
            let started = Instant::now();

            let result = PollCycle::new(&self.devices, &self.transport, &self.settle)
                .run(&entity.device_entity_id, &self.commands)
                .await;

            meter::set(
                "adb_sensor_cycle_duration_seconds",
                started.elapsed().as_secs_f64(),
                &[("sensor", &entity.name)],
            );
            result
        };

        let status = result.status().to_string();
        meter::increment("adb_sensor_cycles", &[("sensor", &entity.name), ("status", &status)]);

        tracing::info!("Refresh of {} completed, sensor is {}", entity.name, status);
        self.binding.apply(result, &self.publisher).await;
    }
}

/// Fans device state changes out to the sensors polling the device.
pub struct EventRouter {
    bindings: HashMap<String, Vec<SensorBinding>>,
}

impl EventRouter {
    pub fn new(bindings: impl IntoIterator<Item = SensorBinding>) -> Self {
        let mut by_device: HashMap<String, Vec<SensorBinding>> = HashMap::new();

        for binding in bindings {
            by_device
                .entry(binding.entity().device_entity_id.clone())
                .or_default()
                .push(binding);
        }

        Self { bindings: by_device }
    }

    pub fn route(&self, change: &DeviceStateChange) {
        if let Some(bindings) = self.bindings.get(&change.entity_id) {
            for binding in bindings {
                binding.on_device_state_changed(change);
            }
        }
    }

    pub async fn run(self, mut events: impl DeviceStateEvents) {
        while let Some(change) = events.recv().await {
            self.route(&change);
        }

        tracing::warn!("Device state event stream closed, event-driven refresh stopped");
    }
}

/// Lookup of running sensors by name or sensor entity id.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    bindings: Vec<SensorBinding>,
}

impl SensorRegistry {
    pub fn new(bindings: Vec<SensorBinding>) -> Self {
        Self { bindings }
    }

    pub fn all(&self) -> &[SensorBinding] {
        &self.bindings
    }

    pub fn find(&self, name: &str) -> Option<&SensorBinding> {
        self.bindings
            .iter()
            .find(|b| b.entity().name == name || b.entity().sensor_entity_id == name)
    }
}
