#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use taskseq::{
    runtime::{Step, StepContext, StepOutcome, TaskStep, Transition},
    workflow::{SequenceFactory, TypeFactory},
    CancellationToken, SequenceConfig, StepError, TransitionConfig, TypeRegistry,
};
use uuid::Uuid;

pub const WAIT_FOR_CANCEL: &str = "WaitForCancel";
pub const FAIL: &str = "Fail";
pub const FAULT: &str = "Fault";
pub const PANIC: &str = "Panic";
pub const CHATTY: &str = "Chatty";
pub const FLAG: &str = "Flag";

/// Blocks until cancelled; `mode=fault` reports it as a cancellation fault
#[derive(Default)]
pub struct WaitForCancelStep {
    as_fault: bool,
}

#[async_trait]
impl Step for WaitForCancelStep {
    fn type_name(&self) -> &'static str {
        WAIT_FOR_CANCEL
    }

    fn validate_config(&mut self, config: &taskseq::StepConfig) -> anyhow::Result<()> {
        self.as_fault = config.parameters.get("mode").map(String::as_str) == Some("fault");
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        cancel.cancelled().await;
        if self.as_fault {
            Err(StepError::Cancelled)
        } else {
            Ok(StepOutcome::Cancelled)
        }
    }
}

pub struct FailStep;

#[async_trait]
impl Step for FailStep {
    fn type_name(&self) -> &'static str {
        FAIL
    }

    fn validate_config(&mut self, _config: &taskseq::StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Aborted(-5))
    }
}

pub struct FaultStep;

#[async_trait]
impl Step for FaultStep {
    fn type_name(&self) -> &'static str {
        FAULT
    }

    fn validate_config(&mut self, _config: &taskseq::StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        Err(StepError::fault("device not responding"))
    }
}

pub struct PanicStep;

#[async_trait]
impl Step for PanicStep {
    fn type_name(&self) -> &'static str {
        PANIC
    }

    fn validate_config(&mut self, _config: &taskseq::StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        panic!("step blew up")
    }
}

/// Reports through its context before completing
pub struct ChattyStep;

#[async_trait]
impl Step for ChattyStep {
    fn type_name(&self) -> &'static str {
        CHATTY
    }

    fn validate_config(&mut self, _config: &taskseq::StepConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&mut self, ctx: &StepContext<'_>, _cancel: &CancellationToken) -> Result<StepOutcome, StepError> {
        ctx.console(format!("hello from {}", ctx.name));
        ctx.action("measure", "volts", ctx.parameter("volts").unwrap_or("0"));
        ctx.log("Info", "measurement taken", 42);
        Ok(StepOutcome::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagMode {
    Active,
    Inactive,
    Error,
    Panic,
}

/// Guard driven by its `active` parameter: true, false, error or panic.
/// Every evaluation bumps the shared counter.
pub struct FlagTransition {
    mode: FlagMode,
    evaluations: Arc<AtomicUsize>,
}

#[async_trait]
impl Transition for FlagTransition {
    fn type_name(&self) -> &'static str {
        FLAG
    }

    fn validate_config(&mut self, config: &TransitionConfig) -> anyhow::Result<()> {
        self.mode = match config.parameters.get("active").map(String::as_str) {
            Some("true") => FlagMode::Active,
            Some("false") => FlagMode::Inactive,
            Some("error") => FlagMode::Error,
            Some("panic") => FlagMode::Panic,
            other => anyhow::bail!("bad 'active' parameter: {:?}", other),
        };
        Ok(())
    }

    async fn is_true(&self, _current: &TaskStep) -> anyhow::Result<bool> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FlagMode::Active => Ok(true),
            FlagMode::Inactive => Ok(false),
            FlagMode::Error => anyhow::bail!("flag could not be read"),
            FlagMode::Panic => panic!("flag exploded"),
        }
    }
}

/// Factory with every test type; the counter tracks guard evaluations
pub fn test_factory(evaluations: Arc<AtomicUsize>) -> TypeFactory {
    let mut factory = TypeFactory::new();
    factory
        .register_step(WAIT_FOR_CANCEL, || Box::new(WaitForCancelStep::default()))
        .register_step(FAIL, || Box::new(FailStep))
        .register_step(FAULT, || Box::new(FaultStep))
        .register_step(PANIC, || Box::new(PanicStep))
        .register_step(CHATTY, || Box::new(ChattyStep))
        .register_transition(FLAG, move || {
            Box::new(FlagTransition { mode: FlagMode::Inactive, evaluations: Arc::clone(&evaluations) })
        });
    factory
}

pub struct Harness {
    pub registry: Arc<TypeRegistry>,
    pub evaluations: Arc<AtomicUsize>,
}

pub fn harness() -> Harness {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let registry = TypeRegistry::builder()
        .with_factory("test", Arc::new(test_factory(Arc::clone(&evaluations))))
        .build();
    Harness { registry: Arc::new(registry), evaluations }
}

/// Delegates to an inner factory until switched off
pub struct SwitchableFactory {
    pub enabled: Arc<AtomicBool>,
    pub inner: TypeFactory,
}

impl SequenceFactory for SwitchableFactory {
    fn create_step(&self, type_name: &str) -> Option<Box<dyn Step>> {
        if self.enabled.load(Ordering::SeqCst) {
            self.inner.create_step(type_name)
        } else {
            None
        }
    }

    fn create_transition(&self, type_name: &str) -> Option<Box<dyn Transition>> {
        if self.enabled.load(Ordering::SeqCst) {
            self.inner.create_transition(type_name)
        } else {
            None
        }
    }
}

/// Start → `middle` (non-terminal) → terminal no-op, joined by AlwaysTrue
pub fn three_step(middle_type: &str) -> (SequenceConfig, Uuid, Uuid, Uuid) {
    let mut cfg = SequenceConfig::new("three step");
    let start = cfg.add_step("SequenceStart").named("start").id;
    let middle = cfg.add_step(middle_type).named("middle").id;
    let end = cfg.add_step("NoAction").named("end").terminal(true).id;
    cfg.add_transition("AlwaysTrue", start, middle);
    cfg.add_transition("AlwaysTrue", middle, end);
    (cfg, start, middle, end)
}
