//! Step runtime contract
//!
//! `Step` is what a concrete step type implements: its own parameter
//! validation and its execution logic. `TaskStep` wraps a `Step` and supplies
//! the shared skeleton around it: loading from config, two-phase validation,
//! state bookkeeping and result reporting. Faults raised by the concrete
//! implementation (errors or panics) are caught here and turned into outcomes.

use crate::errors::{ConfigLoadError, StepError};
use crate::results::{Disposition, ObjectType, Phase, ResultSink};
use crate::runtime::listener::{StateChange, StateHook};
use crate::workflow::types::StepConfig;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    str::FromStr,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle state shared by steps and sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepState {
    Unknown,
    Ready,
    Running,
    Aborted,
    Cancelled,
    Completed,
}

impl StepState {
    pub const ALL: [StepState; 6] = [
        StepState::Unknown,
        StepState::Ready,
        StepState::Running,
        StepState::Aborted,
        StepState::Cancelled,
        StepState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Unknown => "Unknown",
            StepState::Ready => "Ready",
            StepState::Running => "Running",
            StepState::Aborted => "Aborted",
            StepState::Cancelled => "Cancelled",
            StepState::Completed => "Completed",
        }
    }

    /// Aborted, Cancelled and Completed end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Aborted | StepState::Cancelled | StepState::Completed)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepState {
    type Err = crate::results::UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        StepState::ALL
            .iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| crate::results::UnknownName { kind: "step state", value: s.to_string() })
    }
}

/// Outcome reported by concrete step logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Cancelled,
    /// Carries a negative, implementation-defined reason code
    Aborted(i32),
}

impl StepOutcome {
    pub fn code(&self) -> i32 {
        match self {
            StepOutcome::Completed => 1,
            StepOutcome::Cancelled => 0,
            StepOutcome::Aborted(code) => *code,
        }
    }
}

/// Abort code used when concrete logic faults instead of returning an outcome
pub const STEP_FAULT_CODE: i32 = -2;

/// What concrete step logic can see and report to while it runs
pub struct StepContext<'a> {
    pub step_id: Uuid,
    pub name: &'a str,
    pub parameters: &'a HashMap<String, String>,
    pub results: &'a Arc<ResultSink>,
}

impl StepContext<'_> {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn console(&self, message: impl Into<String>) {
        self.results.add_step_console(self.step_id, message, false);
    }

    pub fn console_error(&self, message: impl Into<String>) {
        self.results.add_step_console(self.step_id, message, true);
    }

    pub fn action(&self, name: impl Into<String>, data_type: impl Into<String>, data: impl Into<String>) {
        self.results.add_step_action(self.step_id, name, data_type, data);
    }

    /// Log entry attributed to this step by name
    pub fn log(&self, severity: impl Into<String>, message: impl Into<String>, line_no: u32) {
        self.results.add_log(message, severity, self.name, line_no);
    }
}

/// Behaviour of a concrete step type
#[async_trait]
pub trait Step: Send + Sync {
    /// Registry name of this type
    fn type_name(&self) -> &'static str;

    /// True only for the marker type that identifies a sequence's entry point
    fn is_sequence_start(&self) -> bool {
        false
    }

    /// Type-specific config checks, run after the base checks pass.
    /// Parsed parameters may be kept on `self` for `execute`.
    fn validate_config(&mut self, config: &StepConfig) -> anyhow::Result<()>;

    /// Perform the step's work. Long-running work should watch `cancel`
    /// and return `StepOutcome::Cancelled` or `Err(StepError::Cancelled)`.
    async fn execute(&mut self, ctx: &StepContext<'_>, cancel: &CancellationToken) -> Result<StepOutcome, StepError>;
}

/// Runtime step owned by a `TaskSequence`
pub struct TaskStep {
    /// Id from the loaded config, nil until loaded
    id: Uuid,
    /// Position within the sequence definition
    display_order: i32,
    name: String,
    description: String,
    /// Reaching this step completes the sequence
    is_terminal_step: bool,
    /// Current lifecycle state
    state: StepState,
    /// Config kept after a successful load
    config: Option<StepConfig>,
    /// Sink shared with the owning sequence
    results: Arc<ResultSink>,
    /// Channel to the sequence's state listener, if one is attached
    hook: Option<StateHook>,
    /// Concrete step logic resolved from the registry
    behavior: Box<dyn Step>,
}

impl fmt::Debug for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.behavior.type_name())
            .field("state", &self.state)
            .field("is_terminal_step", &self.is_terminal_step)
            .finish()
    }
}

impl TaskStep {
    pub fn new(behavior: Box<dyn Step>) -> Self {
        Self {
            id: Uuid::nil(),
            display_order: 0,
            name: String::new(),
            description: String::new(),
            is_terminal_step: false,
            state: StepState::Unknown,
            config: None,
            results: Arc::new(ResultSink::default()),
            hook: None,
            behavior,
        }
    }

    /// Step id, nil before a successful load
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display_order(&self) -> i32 {
        self.display_order
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_terminal_step(&self) -> bool {
        self.is_terminal_step
    }

    /// Whether the concrete logic marks this as the entry point
    pub fn is_sequence_start(&self) -> bool {
        self.behavior.is_sequence_start()
    }

    /// Registered type name of the concrete logic
    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    /// Current lifecycle state
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Parameters of the loaded config, `None` before a successful load
    pub fn parameters(&self) -> Option<&HashMap<String, String>> {
        self.config.as_ref().map(|c| &c.parameters)
    }

    pub(crate) fn attach_hook(&mut self, hook: StateHook) {
        self.hook = Some(hook);
    }

    pub(crate) fn detach_hook(&mut self) {
        self.hook = None;
    }

    /// Load and validate config, reporting into `results`
    ///
    /// Always brackets its work with Loading-phase Start/End entries and ends
    /// with a Pass or Fail disposition. On success the step becomes Ready.
    pub fn load<'a>(
        &mut self,
        config: impl Into<Option<&'a StepConfig>>,
        results: Arc<ResultSink>,
    ) -> Result<(), ConfigLoadError> {
        let config = config.into();
        let early_id = config.map(|c| c.id).unwrap_or_default();
        self.results = results;

        let _scope = self.results.scope(Phase::Loading, ObjectType::Step, early_id);

        let loaded = self.load_config(config);
        match loaded {
            Ok(()) => {
                self.results
                    .add_disposition(Phase::Loading, ObjectType::Step, self.id, Disposition::Pass);
                self.update_state(StepState::Ready);
                tracing::debug!("Loaded step '{}' ({}) as {}", self.name, self.id, self.type_name());
            }
            Err(_) => {
                self.config = None;
                self.results
                    .add_disposition(Phase::Loading, ObjectType::Step, self.id, Disposition::Fail);
            }
        }
        loaded
    }

    fn load_config(&mut self, config: Option<&StepConfig>) -> Result<(), ConfigLoadError> {
        let Some(config) = config else {
            self.results
                .add_error(Phase::Loading, "Step config is null.", ObjectType::StepConfig, Uuid::nil());
            return Err(ConfigLoadError::NullConfig);
        };
        if config.id.is_nil() {
            self.results.add_error(
                Phase::Loading,
                "Step config contains blank step id.",
                ObjectType::StepConfig,
                config.id,
            );
            return Err(ConfigLoadError::EmptyId);
        }

        self.id = config.id;
        self.name = config.name.clone();
        self.description = config.description.clone();
        self.display_order = config.display_order;
        self.is_terminal_step = config.is_terminal_step;
        self.config = Some(config.clone());

        if !self.validate_config() {
            self.results.add_error(
                Phase::Loading,
                "Step failed to validate config.",
                ObjectType::StepConfig,
                self.id,
            );
            return Err(ConfigLoadError::InvalidConfig);
        }

        Ok(())
    }

    /// Base checks, then the concrete type's own checks
    fn validate_config(&mut self) -> bool {
        let mut passed = true;

        let Some(config) = self.config.as_ref() else {
            self.results
                .add_error(Phase::Loading, "Step missing config.", ObjectType::StepConfig, self.id);
            return false;
        };

        let behavior = &mut self.behavior;
        match catch_unwind(AssertUnwindSafe(|| behavior.validate_config(config))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.results.add_error(
                    Phase::Loading,
                    format!("Step config failed validation: {}", e),
                    ObjectType::StepConfig,
                    self.id,
                );
                passed = false;
            }
            Err(_) => {
                self.results.add_error(
                    Phase::Loading,
                    "Step config validation panicked.",
                    ObjectType::StepConfig,
                    self.id,
                );
                passed = false;
            }
        }

        passed
    }

    /// Run the step once
    ///
    /// Completed, Cancelled or Aborted is always reported as a Running-phase
    /// disposition, and the Start/End bracket closes on every exit path.
    pub async fn execute(&mut self, cancel: &CancellationToken) -> StepOutcome {
        let results = Arc::clone(&self.results);
        let _scope = results.scope(Phase::Running, ObjectType::Step, self.id);

        self.update_state(StepState::Running);
        tracing::info!("▶️ Executing step '{}' ({})", self.name, self.type_name());
        let started = std::time::Instant::now();

        let empty = HashMap::new();
        let ctx = StepContext {
            step_id: self.id,
            name: &self.name,
            parameters: self.config.as_ref().map(|c| &c.parameters).unwrap_or(&empty),
            results: &results,
        };

        let run = AssertUnwindSafe(self.behavior.execute(&ctx, cancel)).catch_unwind().await;

        let outcome = match run {
            Ok(Ok(StepOutcome::Completed)) => StepOutcome::Completed,
            Ok(Ok(StepOutcome::Cancelled)) | Ok(Err(StepError::Cancelled)) => StepOutcome::Cancelled,
            Ok(Ok(StepOutcome::Aborted(code))) => {
                results.add_error(Phase::Running, "Step aborted on error.", ObjectType::Step, self.id);
                StepOutcome::Aborted(if code < 0 { code } else { -1 })
            }
            Ok(Err(StepError::Fault(e))) => {
                results.add_error(
                    Phase::Running,
                    format!("Step aborted on fault: {}", e),
                    ObjectType::Step,
                    self.id,
                );
                StepOutcome::Aborted(STEP_FAULT_CODE)
            }
            Err(_) => {
                results.add_error(Phase::Running, "Step aborted on panic.", ObjectType::Step, self.id);
                StepOutcome::Aborted(STEP_FAULT_CODE)
            }
        };

        let (state, disposition) = match outcome {
            StepOutcome::Completed => (StepState::Completed, Disposition::Completed),
            StepOutcome::Cancelled => (StepState::Cancelled, Disposition::Cancelled),
            StepOutcome::Aborted(_) => (StepState::Aborted, Disposition::Aborted),
        };
        self.update_state(state);
        results.add_disposition(Phase::Running, ObjectType::Step, self.id, disposition);

        tracing::info!(
            "Step '{}' finished as {} in {:?}",
            self.name,
            state,
            started.elapsed()
        );
        outcome
    }

    fn update_state(&mut self, state: StepState) {
        if self.state == state {
            return;
        }
        let old_state = self.state;
        self.state = state;

        self.results
            .add_state_change(ObjectType::Step, self.id, old_state.as_str(), state.as_str());

        if let Some(hook) = &self.hook {
            let change = StateChange::Step {
                step_id: self.id,
                name: self.name.clone(),
                old_state,
                new_state: state,
            };
            if hook.send(change).is_err() {
                tracing::debug!("State listener for step {} is gone", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::EntryType;

    struct Scripted {
        outcome: fn() -> Result<StepOutcome, StepError>,
        reject: bool,
    }

    #[async_trait]
    impl Step for Scripted {
        fn type_name(&self) -> &'static str {
            "Scripted"
        }

        fn validate_config(&mut self, _config: &StepConfig) -> anyhow::Result<()> {
            if self.reject {
                anyhow::bail!("rejected");
            }
            Ok(())
        }

        async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
            (self.outcome)()
        }
    }

    fn step(outcome: fn() -> Result<StepOutcome, StepError>) -> TaskStep {
        TaskStep::new(Box::new(Scripted { outcome, reject: false }))
    }

    fn ok() -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Completed)
    }

    fn config() -> StepConfig {
        StepConfig {
            id: Uuid::new_v4(),
            name: "s".into(),
            step_type: "Scripted".into(),
            ..Default::default()
        }
    }

    fn dispositions(sink: &ResultSink) -> Vec<Disposition> {
        sink.entries_of(EntryType::Disposition)
            .iter()
            .filter_map(|e| e.disposition())
            .collect()
    }

    #[test]
    fn load_rejects_null_and_blank_id_with_distinct_codes() {
        let sink = Arc::new(ResultSink::default());
        let mut s = step(ok);
        assert_eq!(s.load(None::<&StepConfig>, Arc::clone(&sink)), Err(ConfigLoadError::NullConfig));

        let mut s = step(ok);
        let blank = StepConfig::default();
        assert_eq!(s.load(&blank, Arc::clone(&sink)), Err(ConfigLoadError::EmptyId));
        assert_eq!(s.state(), StepState::Unknown);
        assert_eq!(dispositions(&sink), vec![Disposition::Fail, Disposition::Fail]);
        assert_eq!(sink.entries_of(EntryType::Start).len(), 2);
        assert_eq!(sink.entries_of(EntryType::End).len(), 2);
    }

    #[test]
    fn concrete_validation_failure_fails_load() {
        let sink = Arc::new(ResultSink::default());
        let mut s = TaskStep::new(Box::new(Scripted { outcome: ok, reject: true }));
        assert_eq!(s.load(&config(), Arc::clone(&sink)), Err(ConfigLoadError::InvalidConfig));
        assert_eq!(s.state(), StepState::Unknown);
        assert!(s.parameters().is_none());
        assert!(sink
            .entries_of(EntryType::Error)
            .iter()
            .any(|e| e.error_message().unwrap_or_default().contains("rejected")));
    }

    #[test]
    fn load_copies_config_and_becomes_ready() {
        let sink = Arc::new(ResultSink::default());
        let mut cfg = config();
        cfg.is_terminal_step = true;
        cfg.display_order = 7;
        let mut s = step(ok);
        assert_eq!(s.load(&cfg, Arc::clone(&sink)), Ok(()));
        assert_eq!(s.state(), StepState::Ready);
        assert_eq!(s.id(), cfg.id);
        assert!(s.is_terminal_step());
        assert_eq!(s.display_order(), 7);
        assert_eq!(dispositions(&sink), vec![Disposition::Pass]);
        assert_eq!(sink.entries_of(EntryType::StateChange).len(), 1);
    }

    #[tokio::test]
    async fn execute_maps_outcomes_to_states() {
        fn completed() -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Completed)
        }
        fn cancelled() -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Cancelled)
        }
        fn cancel_fault() -> Result<StepOutcome, StepError> {
            Err(StepError::Cancelled)
        }
        fn aborted() -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Aborted(-9))
        }
        fn faulted() -> Result<StepOutcome, StepError> {
            Err(StepError::fault("boom"))
        }
        fn panicked() -> Result<StepOutcome, StepError> {
            panic!("step panicked")
        }

        type Script = fn() -> Result<StepOutcome, StepError>;
        let cases = [
            (completed as Script, StepState::Completed, 1),
            (cancelled as Script, StepState::Cancelled, 0),
            (cancel_fault as Script, StepState::Cancelled, 0),
            (aborted as Script, StepState::Aborted, -9),
            (faulted as Script, StepState::Aborted, STEP_FAULT_CODE),
            (panicked as Script, StepState::Aborted, STEP_FAULT_CODE),
        ];

        for (outcome, expected_state, expected_code) in cases {
            let sink = Arc::new(ResultSink::default());
            let mut s = step(outcome);
            s.load(&config(), Arc::clone(&sink)).unwrap();
            let result = s.execute(&CancellationToken::new()).await;
            assert_eq!(result.code(), expected_code);
            assert_eq!(s.state(), expected_state);

            let running: Vec<EntryType> = sink
                .entries()
                .iter()
                .filter(|e| e.phase == Phase::Running)
                .map(|e| e.entry_type())
                .collect();
            assert_eq!(running.first(), Some(&EntryType::Start));
            assert_eq!(running.last(), Some(&EntryType::End));
            if expected_state == StepState::Aborted {
                assert!(running.contains(&EntryType::Error));
            }
        }
    }
}
