//! Engine configuration
//!
//! Notification filters, result clearing and logging, read from `TASKSEQ_*`
//! environment variables with sensible fallbacks.

use crate::results::{EntryType, NotifyFilter, Phase};
use crate::runtime::step::StepState;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Display, path::PathBuf, str::FromStr};

/// Runtime options for `TaskSequence`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Drop Loading/Validation entries when a run starts, keeping only Running
    /// output. Observers listening to those phases have already been sent them.
    pub clear_results_on_running: bool,
    /// Phases that trigger result notifications
    pub notify_phases: Vec<Phase>,
    /// Entry types that trigger result notifications
    pub notify_entry_types: Vec<EntryType>,
    /// Step states forwarded to state listeners
    pub notify_step_states: Vec<StepState>,
    /// Max tracing level for the binary (e.g. "info", "debug")
    pub log_level: String,
    /// Sequence definition the binary runs when no path argument is given
    pub sequence_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Defaults without consulting the environment
    pub fn builtin() -> Self {
        Self {
            clear_results_on_running: true,
            notify_phases: vec![Phase::Running],
            notify_entry_types: EntryType::ALL
                .into_iter()
                .filter(|t| *t != EntryType::StateChange)
                .collect(),
            notify_step_states: vec![
                StepState::Running,
                StepState::Aborted,
                StepState::Cancelled,
                StepState::Completed,
            ],
            log_level: "info".to_string(),
            sequence_file: None,
        }
    }

    /// Built-in defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::builtin();
        Self {
            clear_results_on_running: lookup("TASKSEQ_CLEAR_RESULTS_ON_RUNNING")
                .and_then(|raw| parse_bool("TASKSEQ_CLEAR_RESULTS_ON_RUNNING", &raw))
                .unwrap_or(defaults.clear_results_on_running),
            notify_phases: lookup("TASKSEQ_NOTIFY_PHASES")
                .map(|raw| parse_list("TASKSEQ_NOTIFY_PHASES", &raw))
                .unwrap_or(defaults.notify_phases),
            notify_entry_types: lookup("TASKSEQ_NOTIFY_ENTRY_TYPES")
                .map(|raw| parse_list("TASKSEQ_NOTIFY_ENTRY_TYPES", &raw))
                .unwrap_or(defaults.notify_entry_types),
            notify_step_states: lookup("TASKSEQ_NOTIFY_STEP_STATES")
                .map(|raw| parse_list("TASKSEQ_NOTIFY_STEP_STATES", &raw))
                .unwrap_or(defaults.notify_step_states),
            log_level: lookup("TASKSEQ_LOG_LEVEL").unwrap_or(defaults.log_level),
            sequence_file: lookup("TASKSEQ_SEQUENCE_FILE")
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn notify_filter(&self) -> NotifyFilter {
        NotifyFilter::new(self.notify_entry_types.iter().copied(), self.notify_phases.iter().copied())
    }

    pub fn step_state_filter(&self) -> HashSet<StepState> {
        self.notify_step_states.iter().copied().collect()
    }
}

impl Default for EngineConfig {
    /// Default configuration with ENV_VAR support
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_bool(var: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("⚠️ Ignoring {}={}, expected a boolean", var, other);
            None
        }
    }
}

/// Comma-separated names; unknown ones are skipped with a warning
fn parse_list<T>(var: &str, raw: &str) -> Vec<T>
where
    T: FromStr + PartialEq,
    T::Err: Display,
{
    let mut values = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<T>() {
            Ok(value) if !values.contains(&value) => values.push(value),
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ Skipping entry in {}: {}", var, e),
        }
    }
    values
}
