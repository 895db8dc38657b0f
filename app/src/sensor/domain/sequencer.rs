use std::collections::BTreeMap;

use super::{CommandSpec, ConfigurationError, ResolvedCommand};

pub const KEYWORD_PLACEHOLDER: &str = "{grep_keywords}";

/// Joins the trimmed keywords into an alternation usable with `grep -E`.
pub fn grep_pattern(keywords: &BTreeMap<String, String>) -> String {
    keywords.keys().map(|k| k.trim()).collect::<Vec<_>>().join("|")
}

/// Resolves the configured commands into the exact command lines of one cycle.
///
/// Output order equals input order. Commands can depend on device state left behind by
/// their predecessors, so callers must execute them one after another.
pub fn build_commands(commands: &[CommandSpec]) -> Result<Vec<ResolvedCommand>, ConfigurationError> {
    commands
        .iter()
        .enumerate()
        .map(|(index, spec)| -> Result<ResolvedCommand, ConfigurationError> {
            let template = spec
                .template
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or(ConfigurationError::MissingCommandTemplate { index })?;

            Ok(ResolvedCommand {
                command: template.replace(KEYWORD_PLACEHOLDER, &grep_pattern(&spec.keywords)),
                keywords: spec.keywords.clone(),
            })
        })
        .collect()
}
