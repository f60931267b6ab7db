//! Sequence execution engine
//!
//! `TaskSequence` turns a `SequenceConfig` into runtime steps and transitions,
//! validates the resulting graph, and then walks it one step at a time: run
//! the current step, pick the first active outgoing transition in display
//! order, advance, until a terminal step completes, the run is cancelled, or
//! something aborts it. Every outcome is reported through the result sink and
//! nothing escapes `execute` as a panic.

use crate::config::EngineConfig;
use crate::errors::{AbortReason, ExecuteOutcome, LoadError};
use crate::results::{Disposition, ObjectType, Phase, ResultObserver, ResultSink};
use crate::runtime::listener::{spawn_listener, StateChange, StateHook, StateListener};
use crate::runtime::step::{StepOutcome, StepState, TaskStep};
use crate::runtime::transition::{GuardResult, TaskTransition};
use crate::runtime::validator;
use crate::workflow::registry::TypeRegistry;
use crate::workflow::types::SequenceConfig;
use futures::FutureExt;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runtime orchestrator for one sequence instance
///
/// Load once, execute once. A failed load or a finished run is terminal for
/// the instance; build a new one to retry.
pub struct TaskSequence {
    /// Id from the loaded config
    id: Uuid,
    name: String,
    description: String,
    /// Runtime steps in definition order
    steps: Vec<TaskStep>,
    /// Runtime transitions in definition order
    transitions: Vec<TaskTransition>,
    /// Set once validation finds exactly one start step
    start_step_id: Option<Uuid>,
    /// Step being executed, or the last one executed
    current_step_id: Option<Uuid>,
    /// Lifecycle state of the sequence itself
    state: StepState,
    /// Shared result log for the sequence and all its parts
    results: Arc<ResultSink>,
    /// Resolves type names into step and transition logic
    registry: Arc<TypeRegistry>,
    /// Drop earlier results when a run starts
    clear_results_on_running: bool,
    /// Step states forwarded to the state listener
    step_states: HashSet<StepState>,
    /// Channel to the state listener, if one is attached
    hook: Option<StateHook>,
    /// Set by the first `load` call, successful or not
    load_attempted: bool,
}

impl fmt::Debug for TaskSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSequence")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("steps", &self.steps.len())
            .field("transitions", &self.transitions.len())
            .field("current_step_id", &self.current_step_id)
            .finish()
    }
}

impl TaskSequence {
    /// Empty sequence using built-in defaults, independent of the environment
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(&EngineConfig::builtin(), registry)
    }

    /// Empty sequence using the given notification and clearing settings
    pub fn with_config(config: &EngineConfig, registry: Arc<TypeRegistry>) -> Self {
        Self {
            id: Uuid::nil(),
            name: String::new(),
            description: String::new(),
            steps: Vec::new(),
            transitions: Vec::new(),
            start_step_id: None,
            current_step_id: None,
            state: StepState::Unknown,
            results: Arc::new(ResultSink::new(config.notify_filter())),
            registry,
            clear_results_on_running: config.clear_results_on_running,
            step_states: config.step_state_filter(),
            hook: None,
            load_attempted: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Lifecycle state of the sequence
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Step being executed; `None` unless the sequence is Running
    pub fn current_step_id(&self) -> Option<Uuid> {
        self.current_step_id
    }

    /// Start step found by validation
    pub fn start_step_id(&self) -> Option<Uuid> {
        self.start_step_id
    }

    /// Result log shared with every step and transition
    pub fn results(&self) -> &Arc<ResultSink> {
        &self.results
    }

    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    pub fn transitions(&self) -> &[TaskTransition] {
        &self.transitions
    }

    /// Runtime step with the given id
    pub fn step(&self, id: Uuid) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// Forward qualifying result entries to `observer` on a background worker
    pub fn subscribe<O: ResultObserver>(&self, observer: O) {
        self.results.subscribe(observer);
    }

    /// Receive step and sequence state changes on a background worker
    ///
    /// Step changes are filtered by the configured step states. Replaces any
    /// previous listener.
    pub fn set_state_listener<L: StateListener>(&mut self, listener: L) {
        let hook = spawn_listener(Arc::new(listener), self.step_states.clone());
        for step in &mut self.steps {
            step.attach_hook(hook.clone());
        }
        self.hook = Some(hook);
    }

    /// Detach the state listener; its worker stops once drained
    pub fn clear_state_listener(&mut self) {
        self.detach_hooks();
    }

    /// Build and validate runtime steps and transitions from `config`
    ///
    /// On success the sequence is Ready. On failure every partially built
    /// runtime object is discarded and the instance stays unusable.
    pub fn load<'a>(&mut self, config: impl Into<Option<&'a SequenceConfig>>) -> Result<(), LoadError> {
        let config = config.into();
        if self.load_attempted {
            self.results.add_error(
                Phase::Loading,
                "Sequence was already loaded, create a new instance to load again.",
                ObjectType::Sequence,
                self.id,
            );
            return Err(LoadError::AlreadyLoaded);
        }
        self.load_attempted = true;

        let results = Arc::clone(&self.results);
        let _scope = results.scope(
            Phase::Loading,
            ObjectType::Sequence,
            config.map(|c| c.id).unwrap_or_default(),
        );

        let loaded = self.load_config(config);
        match loaded {
            Ok(()) => {
                results.add_disposition(Phase::Loading, ObjectType::Sequence, self.id, Disposition::Pass);
                self.update_state(StepState::Ready);
                tracing::info!(
                    "✅ Loaded sequence '{}' with {} steps and {} transitions",
                    self.name,
                    self.steps.len(),
                    self.transitions.len()
                );
            }
            Err(e) => {
                self.detach_hooks();
                self.steps.clear();
                self.transitions.clear();
                self.start_step_id = None;
                results.add_disposition(Phase::Loading, ObjectType::Sequence, self.id, Disposition::Fail);
                tracing::warn!("❌ Sequence '{}' failed to load: {}", self.name, e);
            }
        }
        loaded
    }

    fn load_config(&mut self, config: Option<&SequenceConfig>) -> Result<(), LoadError> {
        let Some(config) = config else {
            self.results
                .add_error(Phase::Loading, "Sequence config is null.", ObjectType::SequenceConfig, Uuid::nil());
            return Err(LoadError::NullConfig);
        };
        if config.id.is_nil() {
            self.results.add_error(
                Phase::Loading,
                "Sequence config contains blank sequence id.",
                ObjectType::SequenceConfig,
                config.id,
            );
            return Err(LoadError::EmptyId);
        }

        self.id = config.id;
        self.name = config.name.clone();
        self.description = config.description.clone();

        if config.steps.is_empty() {
            self.results.add_error(
                Phase::Loading,
                "Sequence config contains no steps to execute.",
                ObjectType::SequenceConfig,
                config.id,
            );
            return Err(LoadError::NoSteps);
        }

        if !self.load_steps(config) {
            return Err(LoadError::StepLoad);
        }
        if !self.load_transitions(config) {
            return Err(LoadError::TransitionLoad);
        }

        self.validate(config)
    }

    /// Build every step, reporting each failure; false if any failed
    fn load_steps(&mut self, config: &SequenceConfig) -> bool {
        let mut ok = true;
        let mut seen = HashSet::new();

        for step_config in &config.steps {
            if step_config.id.is_nil() {
                self.results.add_error(
                    Phase::Loading,
                    "Step config contains blank step id.",
                    ObjectType::StepConfig,
                    step_config.id,
                );
                ok = false;
                continue;
            }
            if !seen.insert(step_config.id) {
                self.results.add_error(
                    Phase::Loading,
                    "Step config id is used by more than one step.",
                    ObjectType::StepConfig,
                    step_config.id,
                );
                ok = false;
                continue;
            }
            if step_config.step_type.trim().is_empty() {
                self.results.add_error(
                    Phase::Loading,
                    "Step config contains blank step type.",
                    ObjectType::StepConfig,
                    step_config.id,
                );
                ok = false;
                continue;
            }

            let Some(behavior) = self.registry.resolve_step(&step_config.step_type) else {
                self.results.add_error(
                    Phase::Loading,
                    format!("Unknown step type '{}'.", step_config.step_type),
                    ObjectType::StepConfig,
                    step_config.id,
                );
                ok = false;
                continue;
            };

            let mut step = TaskStep::new(behavior);
            if let Some(hook) = &self.hook {
                step.attach_hook(hook.clone());
            }
            if step.load(step_config, Arc::clone(&self.results)).is_err() {
                ok = false;
            }
            self.steps.push(step);
        }

        ok
    }

    /// Build every transition, reporting each failure; false if any failed
    fn load_transitions(&mut self, config: &SequenceConfig) -> bool {
        let mut ok = true;
        let mut seen = HashSet::new();

        for transition_config in &config.transitions {
            if transition_config.id.is_nil() {
                self.results.add_error(
                    Phase::Loading,
                    "Transition config contains blank transition id.",
                    ObjectType::TransitionConfig,
                    transition_config.id,
                );
                ok = false;
                continue;
            }
            if !seen.insert(transition_config.id) {
                self.results.add_error(
                    Phase::Loading,
                    "Transition config id is used by more than one transition.",
                    ObjectType::TransitionConfig,
                    transition_config.id,
                );
                ok = false;
                continue;
            }
            if transition_config.transition_type.trim().is_empty() {
                self.results.add_error(
                    Phase::Loading,
                    "Transition config contains blank transition type.",
                    ObjectType::TransitionConfig,
                    transition_config.id,
                );
                ok = false;
                continue;
            }

            let Some(behavior) = self.registry.resolve_transition(&transition_config.transition_type) else {
                self.results.add_error(
                    Phase::Loading,
                    format!("Unknown transition type '{}'.", transition_config.transition_type),
                    ObjectType::TransitionConfig,
                    transition_config.id,
                );
                ok = false;
                continue;
            };

            let mut transition = TaskTransition::new(behavior);
            if transition.load(transition_config, &self.results).is_err() {
                ok = false;
            }
            self.transitions.push(transition);
        }

        ok
    }

    fn validate(&mut self, config: &SequenceConfig) -> Result<(), LoadError> {
        let results = Arc::clone(&self.results);
        let _scope = results.scope(Phase::Validation, ObjectType::Sequence, self.id);

        let issues = validator::validate(config, &self.steps, &self.transitions);
        for issue in &issues {
            let (obj_type, obj_id) = issue.object();
            results.add_validation_error(issue.to_string(), obj_type, obj_id);
        }

        if !issues.is_empty() {
            results.add_disposition(Phase::Validation, ObjectType::Sequence, self.id, Disposition::Fail);
            return Err(LoadError::Validation);
        }

        self.start_step_id = self.steps.iter().find(|s| s.is_sequence_start()).map(TaskStep::id);
        results.add_disposition(Phase::Validation, ObjectType::Sequence, self.id, Disposition::Pass);
        Ok(())
    }

    /// Run the loaded graph to completion, cancellation or abort
    ///
    /// Never panics. The Running-phase Start/End bracket for the sequence
    /// always closes, and state listeners are detached on every exit path.
    pub async fn execute(&mut self, cancel: &CancellationToken) -> ExecuteOutcome {
        if self.state != StepState::Ready {
            self.results.add_error(
                Phase::Running,
                format!("Failed to start, sequence not ready, state is {}.", self.state),
                ObjectType::Sequence,
                self.id,
            );
            return ExecuteOutcome::Aborted(AbortReason::NotReady);
        }

        if self.clear_results_on_running {
            self.results.clear();
        }

        let results = Arc::clone(&self.results);
        let scope = results.scope(Phase::Running, ObjectType::Sequence, self.id);
        tracing::info!("🚀 Starting sequence '{}' ({})", self.name, self.id);
        let started = std::time::Instant::now();

        self.update_state(StepState::Running);
        self.current_step_id = self.start_step_id;

        let outcome = match AssertUnwindSafe(self.run(cancel)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => self.abort(
                AbortReason::Fault,
                "Unhandled fault aborted sequence.",
                ObjectType::Sequence,
                self.id,
            ),
        };

        self.detach_hooks();
        drop(scope);

        tracing::info!(
            "🏁 Sequence '{}' finished as {} in {:?}",
            self.name,
            self.state,
            started.elapsed()
        );
        outcome
    }

    async fn run(&mut self, cancel: &CancellationToken) -> ExecuteOutcome {
        while !cancel.is_cancelled() {
            let Some(current_id) = self.current_step_id else {
                return self.abort(
                    AbortReason::MissingCurrentStep,
                    "Sequence missing current step.",
                    ObjectType::Sequence,
                    self.id,
                );
            };
            let Some(index) = self.steps.iter().position(|s| s.id() == current_id) else {
                return self.abort(
                    AbortReason::MissingCurrentStep,
                    "Sequence missing current step.",
                    ObjectType::Step,
                    current_id,
                );
            };

            match self.steps[index].execute(cancel).await {
                StepOutcome::Completed => {}
                StepOutcome::Cancelled => {
                    return self.cancel_run(
                        "Sequence cancelled during step.",
                        ObjectType::Step,
                        current_id,
                        "Step",
                        current_id.to_string(),
                    );
                }
                StepOutcome::Aborted(code) => {
                    tracing::debug!("Step {} aborted with code {}", current_id, code);
                    return self.abort(
                        AbortReason::StepAborted,
                        "Sequence aborted on step error.",
                        ObjectType::Step,
                        current_id,
                    );
                }
            }

            if self.steps[index].is_terminal_step() {
                return self.complete();
            }

            let (transition_id, next_step_id) = match self.select_transition(index).await {
                Ok(selected) => selected,
                Err(reason) => {
                    let message = match reason {
                        AbortReason::NoTransitions => "Sequence missing transition for step.",
                        _ => "Sequence has no active transition for step.",
                    };
                    return self.abort(reason, message, ObjectType::Step, current_id);
                }
            };

            let Some(next) = self.step(next_step_id) else {
                return self.abort(
                    AbortReason::MissingTargetStep,
                    "Sequence missing step from transition.",
                    ObjectType::Transition,
                    transition_id,
                );
            };

            let props = HashMap::from([
                ("fromstep".to_string(), self.steps[index].name().to_string()),
                ("tostep".to_string(), next.name().to_string()),
            ]);
            tracing::debug!(
                "➡️ Transition {} from '{}' to '{}'",
                transition_id,
                self.steps[index].name(),
                next.name()
            );
            self.results
                .add_transition(transition_id, current_id, next_step_id, Some(props));
            self.current_step_id = Some(next_step_id);
        }

        self.cancel_run(
            "Sequence cancelled.",
            ObjectType::Sequence,
            self.id,
            "CancellationToken",
            String::new(),
        )
    }

    /// First active outgoing transition of `self.steps[index]` by ascending display order
    async fn select_transition(&self, index: usize) -> Result<(Uuid, Uuid), AbortReason> {
        let current = &self.steps[index];
        let mut candidates: Vec<&TaskTransition> =
            self.transitions.iter().filter(|t| t.step_id() == current.id()).collect();
        if candidates.is_empty() {
            return Err(AbortReason::NoTransitions);
        }
        // Stable: ties keep definition order
        candidates.sort_by_key(|t| t.display_order());

        for transition in candidates {
            match transition.evaluate(current).await {
                GuardResult::Active => return Ok((transition.id(), transition.next_step_id())),
                GuardResult::Inactive => {}
                GuardResult::Faulted(message) => {
                    self.results.add_error(
                        Phase::Running,
                        format!("Transition guard failed: {}", message),
                        ObjectType::Transition,
                        transition.id(),
                    );
                }
            }
        }

        Err(AbortReason::NoActiveTransition)
    }

    fn complete(&mut self) -> ExecuteOutcome {
        self.current_step_id = None;
        self.update_state(StepState::Completed);
        self.finish(Disposition::Completed);
        ExecuteOutcome::Completed
    }

    fn cancel_run(
        &mut self,
        message: &str,
        obj_type: ObjectType,
        obj_id: Uuid,
        source_type: &str,
        source_id: String,
    ) -> ExecuteOutcome {
        self.current_step_id = None;
        self.results
            .add_cancellation(Phase::Running, message, obj_type, obj_id, source_type, source_id);
        self.update_state(StepState::Cancelled);
        self.finish(Disposition::Cancelled);
        ExecuteOutcome::Cancelled
    }

    fn abort(&mut self, reason: AbortReason, message: &str, obj_type: ObjectType, obj_id: Uuid) -> ExecuteOutcome {
        self.current_step_id = None;
        self.results.add_error(Phase::Running, message, obj_type, obj_id);
        self.update_state(StepState::Aborted);
        self.finish(Disposition::Aborted);
        ExecuteOutcome::Aborted(reason)
    }

    fn finish(&self, disposition: Disposition) {
        self.results
            .add_disposition(Phase::Running, ObjectType::Sequence, self.id, disposition);
        self.results
            .add_overall_disposition(ObjectType::Sequence, self.id, disposition);
    }

    fn update_state(&mut self, state: StepState) {
        if self.state == state {
            return;
        }
        let old_state = self.state;
        self.state = state;

        self.results
            .add_state_change(ObjectType::Sequence, self.id, old_state.as_str(), state.as_str());

        if let Some(hook) = &self.hook {
            let change = StateChange::Sequence { sequence_id: self.id, old_state, new_state: state };
            if hook.send(change).is_err() {
                tracing::debug!("State listener for sequence {} is gone", self.id);
            }
        }
    }

    fn detach_hooks(&mut self) {
        for step in &mut self.steps {
            step.detach_hook();
        }
        self.hook = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::EntryType;

    fn two_step_config() -> SequenceConfig {
        let mut cfg = SequenceConfig::new("two steps");
        let start = cfg.add_step("SequenceStart").named("start").id;
        let end = cfg.add_step("NoAction").named("end").terminal(true).id;
        cfg.add_transition("AlwaysTrue", start, end);
        cfg
    }

    #[tokio::test]
    async fn execute_before_load_is_not_ready() {
        let mut seq = TaskSequence::new(Arc::new(TypeRegistry::new()));
        let outcome = seq.execute(&CancellationToken::new()).await;
        assert_eq!(outcome, ExecuteOutcome::Aborted(AbortReason::NotReady));
        assert_eq!(seq.state(), StepState::Unknown);
        assert_eq!(seq.results().entries_of(EntryType::Error).len(), 1);
        assert!(seq.results().entries_of(EntryType::StateChange).is_empty());
    }

    #[test]
    fn second_load_is_rejected() {
        let cfg = two_step_config();
        let mut seq = TaskSequence::new(Arc::new(TypeRegistry::new()));
        assert_eq!(seq.load(&cfg), Ok(()));
        assert_eq!(seq.load(&cfg), Err(LoadError::AlreadyLoaded));
        assert_eq!(seq.state(), StepState::Ready);
    }

    #[test]
    fn failed_load_discards_runtime_objects() {
        let mut cfg = two_step_config();
        cfg.transitions.clear();
        let mut seq = TaskSequence::new(Arc::new(TypeRegistry::new()));
        assert_eq!(seq.load(&cfg), Err(LoadError::Validation));
        assert!(seq.steps().is_empty());
        assert!(seq.transitions().is_empty());
        assert_eq!(seq.state(), StepState::Unknown);
        assert_eq!(seq.results().last_display_order() as usize, seq.results().len());
    }

    #[tokio::test]
    async fn run_keeps_only_running_entries_when_clearing() {
        let mut seq = TaskSequence::new(Arc::new(TypeRegistry::new()));
        seq.load(&two_step_config()).unwrap();
        assert_eq!(seq.execute(&CancellationToken::new()).await, ExecuteOutcome::Completed);

        let entries = seq.results().entries();
        assert!(entries.iter().all(|e| e.phase == Phase::Running || e.phase == Phase::NA));
        assert_eq!(entries.first().map(|e| e.entry_type()), Some(EntryType::Start));
        assert_eq!(entries.last().map(|e| e.entry_type()), Some(EntryType::End));
        assert_eq!(seq.results().disposition(), Disposition::Completed);
        assert_eq!(seq.current_step_id(), None);
    }

    #[tokio::test]
    async fn finished_sequence_cannot_run_again() {
        let mut seq = TaskSequence::new(Arc::new(TypeRegistry::new()));
        seq.load(&two_step_config()).unwrap();
        seq.execute(&CancellationToken::new()).await;
        assert_eq!(
            seq.execute(&CancellationToken::new()).await,
            ExecuteOutcome::Aborted(AbortReason::NotReady)
        );
        assert_eq!(seq.state(), StepState::Completed);
    }
}
