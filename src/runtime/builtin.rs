//! Built-in step and transition types
//!
//! Always available through the default factory: the sequence-start marker,
//! a no-op step, a cancellable delay, and an unconditional transition.

use crate::errors::StepError;
use crate::runtime::step::{Step, StepContext, StepOutcome, TaskStep};
use crate::runtime::transition::Transition;
use crate::workflow::registry::TypeFactory;
use crate::workflow::types::{StepConfig, TransitionConfig};
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SEQUENCE_START: &str = "SequenceStart";
pub const NO_ACTION: &str = "NoAction";
pub const DELAY: &str = "Delay";
pub const ALWAYS_TRUE: &str = "AlwaysTrue";

/// Delay length in milliseconds
pub const DELAY_TIME_PARAM: &str = "delaytime";

/// Entry point marker; does nothing when run
#[derive(Debug, Default)]
pub struct SequenceStartStep;

#[async_trait]
impl Step for SequenceStartStep {
    fn type_name(&self) -> &'static str {
        SEQUENCE_START
    }

    fn is_sequence_start(&self) -> bool {
        true
    }

    fn validate_config(&mut self, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Completed)
    }
}

#[derive(Debug, Default)]
pub struct NoActionStep;

#[async_trait]
impl Step for NoActionStep {
    fn type_name(&self) -> &'static str {
        NO_ACTION
    }

    fn validate_config(&mut self, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Completed)
    }
}

/// Waits `delaytime` milliseconds, returning early as Cancelled if asked to stop
#[derive(Debug, Default)]
pub struct DelayStep {
    delay: Duration,
}

impl DelayStep {
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Step for DelayStep {
    fn type_name(&self) -> &'static str {
        DELAY
    }

    fn validate_config(&mut self, config: &StepConfig) -> anyhow::Result<()> {
        let raw = config
            .parameters
            .get(DELAY_TIME_PARAM)
            .with_context(|| format!("missing '{}' parameter", DELAY_TIME_PARAM))?;
        let millis: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("'{}' must be a non-negative integer, got '{}'", DELAY_TIME_PARAM, raw))?;
        self.delay = Duration::from_millis(millis);
        Ok(())
    }

    async fn execute(&mut self, ctx: &StepContext<'_>, cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        tracing::debug!("⏳ Step '{}' waiting {:?}", ctx.name, self.delay);
        tokio::select! {
            _ = cancel.cancelled() => Ok(StepOutcome::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok(StepOutcome::Completed),
        }
    }
}

/// Unconditional edge
#[derive(Debug, Default)]
pub struct AlwaysTrueTransition;

#[async_trait]
impl Transition for AlwaysTrueTransition {
    fn type_name(&self) -> &'static str {
        ALWAYS_TRUE
    }

    fn validate_config(&mut self, _config: &TransitionConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn is_true(&self, _current: &TaskStep) -> anyhow::Result<bool> {
        Ok(true)
    }
}

impl TypeFactory {
    /// Factory holding every built-in type
    pub fn builtin() -> Self {
        let mut factory = TypeFactory::new();
        factory
            .register_step(SEQUENCE_START, || Box::new(SequenceStartStep))
            .register_step(NO_ACTION, || Box::new(NoActionStep))
            .register_step(DELAY, || Box::new(DelayStep::default()))
            .register_transition(ALWAYS_TRUE, || Box::new(AlwaysTrueTransition));
        factory
    }
}
