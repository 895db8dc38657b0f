mod keyword;
mod sequencer;

use std::collections::BTreeMap;

use derive_more::derive::{Display, Error};

pub use keyword::{KeywordMatch, find_keywords, label_states, match_keywords};
pub use sequencer::{KEYWORD_PLACEHOLDER, build_commands, grep_pattern};

pub const ATTR_ADB_RESPONSE: &str = "adb_response";
pub const ATTR_DEBUG_COMMAND: &str = "debug_command";
pub const ATTR_DEBUG_KEYWORDS: &str = "debug_keywords";
pub const ATTR_LOG_MESSAGES: &str = "log_messages";
pub const ATTR_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Reachability {
    #[display("unavailable")]
    Unavailable,
    #[display("unknown")]
    Unknown,
    #[display("{_0}")]
    Available(String),
}

impl Reachability {
    pub fn from_state(state: &str) -> Self {
        match state {
            "unavailable" => Reachability::Unavailable,
            "unknown" => Reachability::Unknown,
            other => Reachability::Available(other.to_string()),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Available(_))
    }
}

/// Snapshot of the polled device as the host reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTarget {
    pub entity_id: String,
    pub reachability: Reachability,
    pub adb_response: Option<String>,
}

/// One configured unit of work: a command template and the keywords to look for in its output.
///
/// The template may reference the joined keywords with [`KEYWORD_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub template: Option<String>,
    pub keywords: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(template: impl Into<String>, keywords: &[(&str, &str)]) -> Self {
        Self {
            template: Some(template.into()),
            keywords: keywords.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub command: String,
    pub keywords: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[display("online")]
    Online,
    #[display("offline")]
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LabelState {
    #[display("on")]
    On,
    #[display("off")]
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ConfigurationError {
    #[display("no entity_id configured")]
    MissingEntityId,

    #[display("no ADB command configured")]
    NoCommands,

    #[display("ADB command #{index} has no command template")]
    MissingCommandTemplate { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum OfflineReason {
    #[display("device {entity_id} not found")]
    DeviceNotFound { entity_id: String },

    #[display("device {entity_id} is {reachability}")]
    Unreachable {
        entity_id: String,
        reachability: Reachability,
    },

    #[display("invalid configuration: {_0}")]
    InvalidConfiguration(ConfigurationError),

    #[display("update failed: {message}")]
    Failure { message: String },
}

/// Outcome of one poll cycle. Replaced as a whole by the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    status: SensorStatus,
    attributes: BTreeMap<String, String>,
}

impl PollResult {
    pub fn new(status: SensorStatus, attributes: BTreeMap<String, String>) -> Self {
        Self { status, attributes }
    }

    pub fn status(&self) -> SensorStatus {
        self.status
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn log_messages(&self) -> &str {
        self.attribute(ATTR_LOG_MESSAGES).unwrap_or_default()
    }
}
