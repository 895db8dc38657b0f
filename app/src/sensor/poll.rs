use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use infrastructure::meter;
use serde::Deserialize;
use tokio::time::Instant;

use crate::port::{CommandTransport, DeviceStateAccess};

use super::domain::*;

/// Non-destructive command issued before the configured ones to wake up the ADB connection.
pub const PROBE_COMMAND: &str = "ls";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Sleep the full settle delay after each dispatch.
    #[default]
    Fixed,
    /// Re-read the output attribute until it changes, at most for the settle delay.
    Poll,
}

#[derive(Debug, Clone)]
pub struct SettlePolicy {
    pub mode: SettleMode,
    pub probe_delay: Duration,
    pub command_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            mode: SettleMode::Fixed,
            probe_delay: Duration::from_secs(1),
            command_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }
}

pub struct PollCycle<'a, D, T> {
    devices: &'a D,
    transport: &'a T,
    settle: &'a SettlePolicy,
}

enum Outcome {
    Online,
    Offline(OfflineReason),
}

#[derive(Default)]
struct CycleProgress {
    log: Vec<String>,
    attributes: BTreeMap<String, String>,
}

impl<'a, D, T> PollCycle<'a, D, T>
where
    D: DeviceStateAccess,
    T: CommandTransport,
{
    pub fn new(devices: &'a D, transport: &'a T, settle: &'a SettlePolicy) -> Self {
        Self {
            devices,
            transport,
            settle,
        }
    }

    /// Runs one refresh against the device. Never fails: every problem ends up as an offline result.
    ///
    /// Must not be called concurrently for the same device, as the device has a single output slot.
    #[tracing::instrument(skip_all, fields(entity_id = %entity_id))]
    pub async fn run(&self, entity_id: &str, commands: &[CommandSpec]) -> PollResult {
        let mut progress = CycleProgress::default();

        match self.execute(entity_id, commands, &mut progress).await {
            Ok(Outcome::Online) => progress.online(),
            Ok(Outcome::Offline(reason)) => progress.offline(reason),
            Err(e) => {
                tracing::error!("Error updating ADB sensor of {}: {:?}", entity_id, e);
                progress.offline(OfflineReason::Failure {
                    message: format!("{e:#}"),
                })
            }
        }
    }

    async fn execute(
        &self,
        entity_id: &str,
        commands: &[CommandSpec],
        progress: &mut CycleProgress,
    ) -> anyhow::Result<Outcome> {
        let resolved = match build_commands(commands) {
            Ok(resolved) => resolved,
            Err(e) => return Ok(Outcome::Offline(OfflineReason::InvalidConfiguration(e))),
        };

        let device = match self.devices.device_target(entity_id).await? {
            Some(device) => device,
            None => {
                return Ok(Outcome::Offline(OfflineReason::DeviceNotFound {
                    entity_id: entity_id.to_string(),
                }));
            }
        };

        if !device.reachability.is_reachable() {
            return Ok(Outcome::Offline(OfflineReason::Unreachable {
                entity_id: entity_id.to_string(),
                reachability: device.reachability,
            }));
        }

        progress.log(format!("Device {} is {}", entity_id, device.reachability));
        progress.set(ATTR_DEBUG_KEYWORDS, debug_keywords(&resolved));
        progress.set(
            ATTR_DEBUG_COMMAND,
            resolved.iter().map(|r| r.command.as_str()).collect::<Vec<_>>().join("\n"),
        );

        let mut last_output = device.adb_response;

        progress.log(format!("Sending probe command: {PROBE_COMMAND}"));
        last_output = self
            .dispatch_and_settle(entity_id, PROBE_COMMAND, self.settle.probe_delay, last_output.as_deref())
            .await?;

        for (index, command) in resolved.iter().enumerate() {
            progress.log(format!("Executing command #{}: {}", index, command.command));

            let output = self
                .dispatch_and_settle(entity_id, &command.command, self.settle.command_delay, last_output.as_deref())
                .await?;

            let normalized = match &output {
                Some(raw) => {
                    let normalized = raw.to_lowercase();
                    progress.log(format!("Response of command #{}: {}", index, normalized));
                    progress.set(ATTR_ADB_RESPONSE, normalized.clone());
                    Some(normalized)
                }
                None => {
                    progress.log(format!("Command #{index}: no response, switching its labels off"));
                    None
                }
            };

            let matches = find_keywords(normalized.as_deref(), &command.keywords);
            for m in matches.iter() {
                progress.log(format!(
                    "Keyword '{}' {} -> {}",
                    m.keyword,
                    if m.found { "found" } else { "not found" },
                    m.label
                ));
            }

            for (label, state) in label_states(&matches) {
                progress.set(&label, state.to_string());
            }

            last_output = output;
        }

        Ok(Outcome::Online)
    }

    async fn dispatch_and_settle(
        &self,
        entity_id: &str,
        command: &str,
        max_wait: Duration,
        previous_output: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let dispatched = self.transport.dispatch(entity_id, command).await;
        meter::increment(
            "adb_sensor_commands",
            &[
                ("device", entity_id),
                ("outcome", if dispatched.is_ok() { "dispatched" } else { "failed" }),
            ],
        );
        dispatched.with_context(|| format!("Error dispatching ADB command '{command}' to {entity_id}"))?;

        match self.settle.mode {
            SettleMode::Fixed => {
                tokio::time::sleep(max_wait).await;
                self.read_output(entity_id).await
            }
            SettleMode::Poll => {
                let deadline = Instant::now() + max_wait;

                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tokio::time::sleep(self.settle.poll_interval.min(remaining)).await;

                    let output = self.read_output(entity_id).await?;
                    let changed = output.is_some() && output.as_deref() != previous_output;

                    if changed || Instant::now() >= deadline {
                        return Ok(output);
                    }
                }
            }
        }
    }

    async fn read_output(&self, entity_id: &str) -> anyhow::Result<Option<String>> {
        self.devices
            .adb_response(entity_id)
            .await
            .with_context(|| format!("Error reading ADB response of {entity_id}"))
    }
}

impl CycleProgress {
    fn log(&mut self, message: String) {
        tracing::debug!("{}", message);
        self.log.push(message);
    }

    fn set(&mut self, name: &str, value: String) {
        self.attributes.insert(name.to_string(), value);
    }

    fn online(mut self) -> PollResult {
        self.set(ATTR_LOG_MESSAGES, self.log.join("\n"));
        PollResult::new(SensorStatus::Online, self.attributes)
    }

    fn offline(mut self, reason: OfflineReason) -> PollResult {
        tracing::warn!("ADB sensor offline: {}", reason);

        self.log(format!("Offline: {reason}"));
        self.set(ATTR_ERROR, reason.to_string());
        self.set(ATTR_LOG_MESSAGES, self.log.join("\n"));
        PollResult::new(SensorStatus::Offline, self.attributes)
    }
}

fn debug_keywords(commands: &[ResolvedCommand]) -> String {
    commands
        .iter()
        .flat_map(|c| c.keywords.keys())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
