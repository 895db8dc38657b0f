use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::domain::{CommandSpec, ConfigurationError, build_commands};
use super::schedule::{DEFAULT_SCAN_INTERVAL, RefreshSchedule};
use super::{SensorDefinition, SensorEntity};

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub name: Option<String>,
    pub entity_id: Option<String>,
    pub scan_interval: Option<ScanInterval>,
    pub adb_commands: Option<Vec<CommandConfig>>,

    //legacy single command
    pub adb_command: Option<String>,
    #[serde(default)]
    pub keywords: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub adb_command: Option<String>,
    #[serde(default)]
    pub keywords: BTreeMap<String, String>,
}

/// Seconds, `HH:MM:SS` or an ISO-8601 duration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScanInterval {
    Seconds(f64),
    Text(String),
    Invalid(serde_json::Value),
}

enum CommandSchema {
    Sequence(Vec<CommandConfig>),
    Legacy(CommandConfig),
}

/// Validates all configured sensors. Invalid ones are logged and skipped, as is a sensor whose
/// entity id is already taken.
pub fn load_definitions(configs: Vec<SensorConfig>) -> Vec<SensorDefinition> {
    let mut definitions: Vec<SensorDefinition> = vec![];

    for config in configs {
        let name = config.display_name().to_string();

        let definition = match config.into_definition() {
            Ok(definition) => definition,
            Err(e) => {
                tracing::error!("Skipping sensor {}: {}", name, e);
                continue;
            }
        };

        let duplicate = definitions
            .iter()
            .find(|d| d.entity.sensor_entity_id == definition.entity.sensor_entity_id);

        if let Some(existing) = duplicate {
            tracing::error!(
                "Skipping sensor {}: entity {} already used by sensor {}",
                name,
                definition.entity.sensor_entity_id,
                existing.entity.name
            );
            continue;
        }

        tracing::info!(
            "Configured sensor {} ({}) for {} with {} command(s)",
            definition.entity.name,
            definition.entity.sensor_entity_id,
            definition.entity.device_entity_id,
            definition.commands.len()
        );
        definitions.push(definition);
    }

    definitions
}

impl SensorConfig {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.entity_id.as_deref())
            .unwrap_or("<unnamed>")
    }

    pub fn into_definition(self) -> Result<SensorDefinition, ConfigurationError> {
        let entity_id = self
            .entity_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigurationError::MissingEntityId)?;
        let name = self.name.clone().unwrap_or_else(|| entity_id.clone());
        let schedule = RefreshSchedule::new(self.update_interval());

        let commands = self.command_schema().ok_or(ConfigurationError::NoCommands)?.into_specs();
        build_commands(&commands)?;

        Ok(SensorDefinition {
            entity: SensorEntity::new(name, entity_id),
            schedule,
            commands,
        })
    }

    fn command_schema(self) -> Option<CommandSchema> {
        match (self.adb_commands, self.adb_command) {
            (Some(commands), legacy) if !commands.is_empty() => {
                if legacy.is_some() {
                    tracing::warn!("Both adb_commands and adb_command configured, ignoring adb_command");
                }
                Some(CommandSchema::Sequence(commands))
            }
            (_, Some(adb_command)) => Some(CommandSchema::Legacy(CommandConfig {
                adb_command: Some(adb_command),
                keywords: self.keywords,
            })),
            _ => None,
        }
    }

    fn update_interval(&self) -> Duration {
        let Some(raw) = &self.scan_interval else {
            return DEFAULT_SCAN_INTERVAL;
        };

        match raw.to_duration() {
            Some(interval) => interval,
            None => {
                tracing::error!(
                    "Invalid scan_interval {:?} for {}, using default of {} seconds",
                    raw,
                    self.display_name(),
                    DEFAULT_SCAN_INTERVAL.as_secs()
                );
                DEFAULT_SCAN_INTERVAL
            }
        }
    }
}

impl CommandSchema {
    fn into_specs(self) -> Vec<CommandSpec> {
        let configs = match self {
            CommandSchema::Sequence(commands) => commands,
            CommandSchema::Legacy(command) => vec![command],
        };

        configs
            .into_iter()
            .map(|c| CommandSpec {
                template: c.adb_command,
                keywords: c.keywords,
            })
            .collect()
    }
}

impl ScanInterval {
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            ScanInterval::Seconds(secs) => from_secs(*secs),
            ScanInterval::Text(text) => parse_interval(text.trim()),
            ScanInterval::Invalid(_) => None,
        }
    }
}

fn from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_interval(text: &str) -> Option<Duration> {
    if let Ok(secs) = text.parse::<f64>() {
        return from_secs(secs);
    }

    if text.contains(':') {
        return parse_clock_format(text);
    }

    text.parse::<iso8601_duration::Duration>().ok()?.to_std()
}

//HH:MM:SS or MM:SS
fn parse_clock_format(text: &str) -> Option<Duration> {
    let parts = text
        .split(':')
        .map(|p| p.parse::<f64>().ok().filter(|v| *v >= 0.0))
        .collect::<Option<Vec<_>>>()?;

    let secs = match parts.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        _ => return None,
    };

    from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(toml: &str) -> SensorConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn current_schema_keeps_command_order() {
        let definition = sensor(
            r#"
            name = "Living Room TV"
            entity_id = "media_player.android_tv"
            scan_interval = 60
            adb_commands = [
                { adb_command = "input keyevent KEYCODE_MENU" },
                { adb_command = "dumpsys {grep_keywords}", keywords = { youtube = "youtube_app" } },
            ]
            "#,
        )
        .into_definition()
        .unwrap();

        assert_eq!(definition.entity.name, "Living Room TV");
        assert_eq!(definition.entity.device_entity_id, "media_player.android_tv");
        assert_eq!(definition.entity.sensor_entity_id, "sensor.living_room_tv");
        assert_eq!(definition.schedule.interval, Duration::from_secs(60));
        assert_eq!(
            definition.commands,
            vec![
                CommandSpec::new("input keyevent KEYCODE_MENU", &[]),
                CommandSpec::new("dumpsys {grep_keywords}", &[("youtube", "youtube_app")]),
            ]
        );
    }

    #[test]
    fn legacy_schema_is_lifted_to_single_command() {
        let definition = sensor(
            r#"
            name = "tv"
            entity_id = "media_player.android_tv"
            adb_command = "dumpsys window | grep -E '{grep_keywords}'"
            keywords = { netflix = "netflix_app", kodi = "kodi_app" }
            "#,
        )
        .into_definition()
        .unwrap();

        assert_eq!(
            definition.commands,
            vec![CommandSpec::new(
                "dumpsys window | grep -E '{grep_keywords}'",
                &[("kodi", "kodi_app"), ("netflix", "netflix_app")]
            )]
        );
        assert_eq!(definition.schedule.interval, DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn name_defaults_to_entity_id() {
        let definition = sensor(
            r#"
            entity_id = "media_player.android_tv"
            adb_command = "ls"
            "#,
        )
        .into_definition()
        .unwrap();

        assert_eq!(definition.entity.name, "media_player.android_tv");
    }

    #[test]
    fn missing_entity_id_is_rejected() {
        let result = sensor(r#"name = "tv""#).into_definition();

        assert_eq!(result.unwrap_err(), ConfigurationError::MissingEntityId);
    }

    #[test]
    fn missing_command_is_rejected() {
        let result = sensor(
            r#"
            name = "tv"
            entity_id = "media_player.android_tv"
            keywords = { youtube = "youtube_app" }
            "#,
        )
        .into_definition();

        assert_eq!(result.unwrap_err(), ConfigurationError::NoCommands);
    }

    #[test]
    fn command_without_template_is_rejected() {
        let result = sensor(
            r#"
            name = "tv"
            entity_id = "media_player.android_tv"
            adb_commands = [
                { adb_command = "ls" },
                { keywords = { youtube = "youtube_app" } },
            ]
            "#,
        )
        .into_definition();

        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::MissingCommandTemplate { index: 1 }
        );
    }

    #[test]
    fn scan_interval_formats() {
        let secs = |raw: ScanInterval| raw.to_duration().map(|d| d.as_secs_f64());

        assert_eq!(secs(ScanInterval::Seconds(30.0)), Some(30.0));
        assert_eq!(secs(ScanInterval::Seconds(0.0)), Some(0.0));
        assert_eq!(secs(ScanInterval::Text("45".to_string())), Some(45.0));
        assert_eq!(secs(ScanInterval::Text("00:02:30".to_string())), Some(150.0));
        assert_eq!(secs(ScanInterval::Text("PT5M".to_string())), Some(300.0));
        assert_eq!(secs(ScanInterval::Seconds(-1.0)), None);
        assert_eq!(secs(ScanInterval::Text("soon".to_string())), None);
        assert_eq!(secs(ScanInterval::Invalid(serde_json::Value::Bool(true))), None);
    }

    #[test]
    fn invalid_and_duplicate_sensors_are_skipped_but_devices_can_be_shared() {
        let configs = vec![
            sensor(r#"entity_id = "media_player.tv""#),
            sensor(
                r#"
                name = "tv"
                entity_id = "media_player.tv"
                adb_command = "ls"
                "#,
            ),
            sensor(
                r#"
                name = "tv again"
                entity_id = "media_player.tv"
                adb_command = "ls"
                "#,
            ),
            sensor(
                r#"
                name = "TV"
                entity_id = "media_player.box"
                adb_command = "ls"
                "#,
            ),
            sensor(
                r#"
                name = "box"
                entity_id = "media_player.box"
                adb_command = "ls"
                "#,
            ),
        ];

        let names = load_definitions(configs)
            .into_iter()
            .map(|d| d.entity.name)
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["tv", "tv again", "box"]);
    }

    #[test]
    fn invalid_scan_interval_falls_back_to_default() {
        let definition = sensor(
            r#"
            entity_id = "media_player.android_tv"
            scan_interval = "every now and then"
            adb_command = "ls"
            "#,
        )
        .into_definition()
        .unwrap();

        assert_eq!(definition.schedule.interval, DEFAULT_SCAN_INTERVAL);
    }
}
