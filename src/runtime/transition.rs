//! Transition runtime contract
//!
//! A transition is a guarded edge between two steps. `Transition` holds the
//! concrete guard; `TaskTransition` wraps it with config loading and with
//! fault isolation around guard evaluation.

use crate::errors::ConfigLoadError;
use crate::results::{Disposition, ObjectType, Phase, ResultSink};
use crate::runtime::step::TaskStep;
use crate::workflow::types::TransitionConfig;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionState {
    Unknown,
    Ready,
    Error,
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionState::Unknown => "Unknown",
            TransitionState::Ready => "Ready",
            TransitionState::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Guard logic of a concrete transition type
///
/// Guards are expected to be free of side effects: the engine stops at the
/// first active guard, so later guards of the same step may never run.
#[async_trait]
pub trait Transition: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn validate_config(&mut self, config: &TransitionConfig) -> anyhow::Result<()>;

    /// Whether the edge may be taken after `current` completed
    async fn is_true(&self, current: &TaskStep) -> anyhow::Result<bool>;
}

/// Result of evaluating one guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    Active,
    Inactive,
    /// The guard failed or panicked; treated as inactive by the engine
    Faulted(String),
}

impl GuardResult {
    pub fn is_active(&self) -> bool {
        matches!(self, GuardResult::Active)
    }
}

/// Runtime transition owned by a `TaskSequence`
pub struct TaskTransition {
    id: Uuid,
    display_order: i32,
    name: String,
    description: String,
    step_id: Uuid,
    next_step_id: Uuid,
    state: TransitionState,
    config: Option<TransitionConfig>,
    behavior: Box<dyn Transition>,
}

impl fmt::Debug for TaskTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTransition")
            .field("id", &self.id)
            .field("type", &self.behavior.type_name())
            .field("step_id", &self.step_id)
            .field("next_step_id", &self.next_step_id)
            .field("display_order", &self.display_order)
            .field("state", &self.state)
            .finish()
    }
}

impl TaskTransition {
    pub fn new(behavior: Box<dyn Transition>) -> Self {
        Self {
            id: Uuid::nil(),
            display_order: 0,
            name: String::new(),
            description: String::new(),
            step_id: Uuid::nil(),
            next_step_id: Uuid::nil(),
            state: TransitionState::Unknown,
            config: None,
            behavior,
        }
    }

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

    pub fn step_id(&self) -> Uuid {
        self.step_id
    }

    pub fn next_step_id(&self) -> Uuid {
        self.next_step_id
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    pub fn parameters(&self) -> Option<&HashMap<String, String>> {
        self.config.as_ref().map(|c| &c.parameters)
    }

    /// Load and validate config, reporting into `results`
    ///
    /// Ready on success, Error on any failure.
    pub fn load<'a>(
        &mut self,
        config: impl Into<Option<&'a TransitionConfig>>,
        results: &Arc<ResultSink>,
    ) -> Result<(), ConfigLoadError> {
        let config = config.into();
        let _scope = results.scope(
            Phase::Loading,
            ObjectType::Transition,
            config.map(|c| c.id).unwrap_or_default(),
        );

        let loaded = self.load_config(config, results);
        match loaded {
            Ok(()) => {
                self.state = TransitionState::Ready;
                results.add_disposition(Phase::Loading, ObjectType::Transition, self.id, Disposition::Pass);
            }
            Err(_) => {
                self.config = None;
                self.state = TransitionState::Error;
                results.add_disposition(Phase::Loading, ObjectType::Transition, self.id, Disposition::Fail);
            }
        }
        loaded
    }

    fn load_config(&mut self, config: Option<&TransitionConfig>, results: &ResultSink) -> Result<(), ConfigLoadError> {
        let Some(config) = config else {
            results.add_error(
                Phase::Loading,
                "Transition config is null.",
                ObjectType::TransitionConfig,
                Uuid::nil(),
            );
            return Err(ConfigLoadError::NullConfig);
        };
        if config.id.is_nil() {
            results.add_error(
                Phase::Loading,
                "Transition config contains blank transition id.",
                ObjectType::TransitionConfig,
                config.id,
            );
            return Err(ConfigLoadError::EmptyId);
        }

        self.id = config.id;
        self.name = config.name.clone();
        self.description = config.description.clone();
        self.display_order = config.display_order;
        self.step_id = config.step_id;
        self.next_step_id = config.next_step_id;

        let mut valid = true;
        if config.step_id.is_nil() {
            results.add_error(
                Phase::Loading,
                "Transition config contains blank source step id.",
                ObjectType::TransitionConfig,
                self.id,
            );
            valid = false;
        }
        if config.next_step_id.is_nil() {
            results.add_error(
                Phase::Loading,
                "Transition config contains blank target step id.",
                ObjectType::TransitionConfig,
                self.id,
            );
            valid = false;
        }

        let behavior = &mut self.behavior;
        match catch_unwind(AssertUnwindSafe(|| behavior.validate_config(config))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                results.add_error(
                    Phase::Loading,
                    format!("Transition config failed validation: {}", e),
                    ObjectType::TransitionConfig,
                    self.id,
                );
                valid = false;
            }
            Err(_) => {
                results.add_error(
                    Phase::Loading,
                    "Transition config validation panicked.",
                    ObjectType::TransitionConfig,
                    self.id,
                );
                valid = false;
            }
        }

        if !valid {
            return Err(ConfigLoadError::InvalidConfig);
        }
        self.config = Some(config.clone());
        Ok(())
    }

    /// Evaluate the guard against the step that just completed
    pub async fn evaluate(&self, current: &TaskStep) -> GuardResult {
        match AssertUnwindSafe(self.behavior.is_true(current)).catch_unwind().await {
            Ok(Ok(true)) => GuardResult::Active,
            Ok(Ok(false)) => GuardResult::Inactive,
            Ok(Err(e)) => GuardResult::Faulted(e.to_string()),
            Err(_) => GuardResult::Faulted("guard panicked".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::EntryType;
    use crate::runtime::step::{Step, StepContext, StepOutcome};
    use crate::errors::StepError;
    use tokio_util::sync::CancellationToken;

    struct Guard(fn() -> anyhow::Result<bool>);

    #[async_trait]
    impl Transition for Guard {
        fn type_name(&self) -> &'static str {
            "Guard"
        }

        fn validate_config(&mut self, _config: &TransitionConfig) -> anyhow::Result<()> {
            Ok(())
        }

        async fn is_true(&self, _current: &TaskStep) -> anyhow::Result<bool> {
            (self.0)()
        }
    }

    struct Idle;

    #[async_trait]
    impl Step for Idle {
        fn type_name(&self) -> &'static str {
            "Idle"
        }

        fn validate_config(&mut self, _config: &crate::workflow::types::StepConfig) -> anyhow::Result<()> {
            Ok(())
        }

        async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Completed)
        }
    }

    fn yes() -> anyhow::Result<bool> {
        Ok(true)
    }

    fn config() -> TransitionConfig {
        TransitionConfig {
            id: Uuid::new_v4(),
            transition_type: "Guard".into(),
            step_id: Uuid::new_v4(),
            next_step_id: Uuid::new_v4(),
            ..Default::default()
        }
    }

    #[test]
    fn load_requires_both_endpoints() {
        let sink = Arc::new(ResultSink::default());
        let mut cfg = config();
        cfg.next_step_id = Uuid::nil();

        let mut t = TaskTransition::new(Box::new(Guard(yes)));
        assert_eq!(t.load(&cfg, &sink), Err(ConfigLoadError::InvalidConfig));
        assert_eq!(t.state(), TransitionState::Error);
        assert_eq!(sink.entries_of(EntryType::Error).len(), 1);
        assert_eq!(sink.entries_of(EntryType::End).len(), 1);
    }

    #[test]
    fn load_success_copies_endpoints() {
        let sink = Arc::new(ResultSink::default());
        let cfg = config();
        let mut t = TaskTransition::new(Box::new(Guard(yes)));
        assert_eq!(t.load(&cfg, &sink), Ok(()));
        assert_eq!(t.state(), TransitionState::Ready);
        assert_eq!((t.step_id(), t.next_step_id()), (cfg.step_id, cfg.next_step_id));
        assert_eq!(
            sink.entries_of(EntryType::Disposition)[0].disposition(),
            Some(Disposition::Pass)
        );
    }

    #[tokio::test]
    async fn guard_faults_are_contained() {
        fn fails() -> anyhow::Result<bool> {
            anyhow::bail!("guard failed")
        }
        fn panics() -> anyhow::Result<bool> {
            panic!("guard panicked")
        }

        let step = TaskStep::new(Box::new(Idle));
        assert_eq!(TaskTransition::new(Box::new(Guard(yes))).evaluate(&step).await, GuardResult::Active);
        assert_eq!(
            TaskTransition::new(Box::new(Guard(fails))).evaluate(&step).await,
            GuardResult::Faulted("guard failed".into())
        );
        assert!(!TaskTransition::new(Box::new(Guard(panics))).evaluate(&step).await.is_active());
    }
}
