use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig, MqttConfig};
use serde::Deserialize;

use crate::sensor::config::SensorConfig;
use crate::sensor::{SettleMode, SettlePolicy};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub homeassistant: crate::adapter::homeassistant::HomeAssistant,
    pub mqtt: MqttConfig,
    pub http_server: HttpServerConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSettings {
    #[serde(default)]
    pub settle: SettleMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            settle: SettleMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollingSettings {
    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            mode: self.settle,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ..SettlePolicy::default()
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::with_prefix("ADB_SENSOR").separator("__"));

        let s = builder.build()?;
        s.try_deserialize()
    }
}
