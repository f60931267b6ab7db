//! Structured result entries
//!
//! Every notable thing that happens while a sequence loads, validates or runs
//! is recorded as a `ResultEntry`. The common header (id, time, phase, object
//! reference, display order) is shared; `EntryKind` carries the per-type data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use uuid::Uuid;

/// Entry type discriminant, used for notification filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Start,
    End,
    Error,
    Cancellation,
    Disposition,
    OverallDisposition,
    Transition,
    StateChange,
    StepAction,
    Console,
    Log,
    UserAction,
}

impl EntryType {
    pub const ALL: [EntryType; 12] = [
        EntryType::Start,
        EntryType::End,
        EntryType::Error,
        EntryType::Cancellation,
        EntryType::Disposition,
        EntryType::OverallDisposition,
        EntryType::Transition,
        EntryType::StateChange,
        EntryType::StepAction,
        EntryType::Console,
        EntryType::Log,
        EntryType::UserAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Start => "Start",
            EntryType::End => "End",
            EntryType::Error => "Error",
            EntryType::Cancellation => "Cancellation",
            EntryType::Disposition => "Disposition",
            EntryType::OverallDisposition => "OverallDisposition",
            EntryType::Transition => "Transition",
            EntryType::StateChange => "StateChange",
            EntryType::StepAction => "StepAction",
            EntryType::Console => "Console",
            EntryType::Log => "Log",
            EntryType::UserAction => "UserAction",
        }
    }
}

/// Lifecycle stage an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    NA,
    Loading,
    Validation,
    Running,
    Reporting,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::NA,
        Phase::Loading,
        Phase::Validation,
        Phase::Running,
        Phase::Reporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NA => "NA",
            Phase::Loading => "Loading",
            Phase::Validation => "Validation",
            Phase::Running => "Running",
            Phase::Reporting => "Reporting",
        }
    }
}

/// Kind of entity that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    SequenceConfig,
    StepConfig,
    TransitionConfig,
    Sequence,
    Step,
    Transition,
    Console,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::SequenceConfig => "SequenceConfig",
            ObjectType::StepConfig => "StepConfig",
            ObjectType::TransitionConfig => "TransitionConfig",
            ObjectType::Sequence => "Sequence",
            ObjectType::Step => "Step",
            ObjectType::Transition => "Transition",
            ObjectType::Console => "Console",
        }
    }
}

/// Final classification of a step, phase or sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    Unknown,
    Skipped,
    Cancelled,
    Aborted,
    Completed,
    Pass,
    PassWithException,
    Fail,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Unknown => "Unknown",
            Disposition::Skipped => "Skipped",
            Disposition::Cancelled => "Cancelled",
            Disposition::Aborted => "Aborted",
            Disposition::Completed => "Completed",
            Disposition::Pass => "Pass",
            Disposition::PassWithException => "PassWithException",
            Disposition::Fail => "Fail",
        }
    }
}

/// Error returned when parsing an enum name from configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} name: {value}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for EntryType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        EntryType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownName { kind: "entry type", value: s.to_string() })
    }
}

impl FromStr for Phase {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Phase::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownName { kind: "phase", value: s.to_string() })
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type payload of a result entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type")]
pub enum EntryKind {
    Start,
    End,
    Error {
        message: String,
    },
    Cancellation {
        message: String,
        source_type: String,
        source_id: String,
    },
    Disposition {
        disposition: Disposition,
    },
    OverallDisposition {
        disposition: Disposition,
    },
    Transition {
        transition_id: Uuid,
        from_step_id: Uuid,
        to_step_id: Uuid,
    },
    StateChange {
        old_state: String,
        new_state: String,
    },
    StepAction {
        name: String,
        data_type: String,
        data: String,
    },
    Console {
        message: String,
        is_error: bool,
    },
    Log {
        severity: String,
        class: String,
        line_no: u32,
        message: String,
    },
    UserAction {
        user_name: String,
        action_type: String,
        category: String,
        response: String,
    },
}

impl EntryKind {
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryKind::Start => EntryType::Start,
            EntryKind::End => EntryType::End,
            EntryKind::Error { .. } => EntryType::Error,
            EntryKind::Cancellation { .. } => EntryType::Cancellation,
            EntryKind::Disposition { .. } => EntryType::Disposition,
            EntryKind::OverallDisposition { .. } => EntryType::OverallDisposition,
            EntryKind::Transition { .. } => EntryType::Transition,
            EntryKind::StateChange { .. } => EntryType::StateChange,
            EntryKind::StepAction { .. } => EntryType::StepAction,
            EntryKind::Console { .. } => EntryType::Console,
            EntryKind::Log { .. } => EntryType::Log,
            EntryKind::UserAction { .. } => EntryType::UserAction,
        }
    }

    fn detail_lines(&self) -> Vec<(&'static str, String)> {
        match self {
            EntryKind::Start | EntryKind::End => Vec::new(),
            EntryKind::Error { message } => vec![("Message", message.clone())],
            EntryKind::Cancellation { message, source_type, source_id } => vec![
                ("Message", message.clone()),
                ("SourceType", source_type.clone()),
                ("SourceId", source_id.clone()),
            ],
            EntryKind::Disposition { disposition } | EntryKind::OverallDisposition { disposition } => {
                vec![("Disposition", disposition.to_string())]
            }
            EntryKind::Transition { transition_id, from_step_id, to_step_id } => vec![
                ("TransitionId", transition_id.to_string()),
                ("FromStepId", from_step_id.to_string()),
                ("ToStepId", to_step_id.to_string()),
            ],
            EntryKind::StateChange { old_state, new_state } => vec![
                ("OldState", old_state.clone()),
                ("NewState", new_state.clone()),
            ],
            EntryKind::StepAction { name, data_type, data } => vec![
                ("Name", name.clone()),
                ("DataType", data_type.clone()),
                ("Data", data.clone()),
            ],
            EntryKind::Console { message, is_error } => vec![
                ("Message", message.clone()),
                ("IsError", is_error.to_string()),
            ],
            EntryKind::Log { severity, class, line_no, message } => vec![
                ("Severity", severity.clone()),
                ("Class", class.clone()),
                ("LineNo", line_no.to_string()),
                ("Message", message.clone()),
            ],
            EntryKind::UserAction { user_name, action_type, category, response } => vec![
                ("UserName", user_name.clone()),
                ("ActionType", action_type.clone()),
                ("Category", category.clone()),
                ("Response", response.clone()),
            ],
        }
    }
}

/// One structured record in a `ResultSink`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub entry_time_utc: DateTime<Utc>,
    /// Assigned by the sink on append, strictly increasing and never reused
    pub display_order: u64,
    pub obj_type: ObjectType,
    pub obj_id: Uuid,
    pub phase: Phase,
    pub parameters: HashMap<String, String>,
    pub kind: EntryKind,
}

impl ResultEntry {
    pub fn new(name: impl Into<String>, phase: Phase, obj_type: ObjectType, obj_id: Uuid, kind: EntryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            entry_time_utc: Utc::now(),
            display_order: 0,
            obj_type,
            obj_id,
            phase,
            parameters: HashMap::new(),
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn entry_type(&self) -> EntryType {
        self.kind.entry_type()
    }

    /// Error message, if this is an error entry
    pub fn error_message(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Disposition carried by Disposition / OverallDisposition entries
    pub fn disposition(&self) -> Option<Disposition> {
        match &self.kind {
            EntryKind::Disposition { disposition } | EntryKind::OverallDisposition { disposition } => {
                Some(*disposition)
            }
            _ => None,
        }
    }

    /// Render as `HH:MM:SS|EntryType|Phase|ObjType|ObjId` followed by
    /// `key = value` lines (parameters sorted by key, then kind details)
    pub fn to_log_entry(&self) -> String {
        let mut out = format!(
            "{}|{}|{}|{}|{}\n",
            self.entry_time_utc.format("%H:%M:%S"),
            self.entry_type(),
            self.phase,
            self.obj_type,
            self.obj_id
        );

        let mut keys: Vec<&String> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("{} = {}\n", key, self.parameters[key]));
        }
        for (key, value) in self.kind.detail_lines() {
            out.push_str(&format!("{} = {}\n", key, value));
        }

        out
    }
}
