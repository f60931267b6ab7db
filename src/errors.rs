//! Error and outcome types shared across the engine
//!
//! Library seams return these typed values instead of raw integers. Each one
//! still maps onto the numeric outcome convention (1 success, 0 cancelled,
//! negative for distinct failures) through its `code()` method.

use thiserror::Error;

/// Reasons a `TaskSequence::load` call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("sequence config is missing")]
    NullConfig,

    #[error("sequence config contains a blank sequence id")]
    EmptyId,

    #[error("sequence config contains no steps to execute")]
    NoSteps,

    #[error("a step failed to load from config")]
    StepLoad,

    #[error("a transition failed to load from config")]
    TransitionLoad,

    #[error("sequence failed graph validation")]
    Validation,

    /// Load is single-shot: a fresh `TaskSequence` is needed to retry
    #[error("sequence was already loaded or a previous load failed")]
    AlreadyLoaded,
}

impl LoadError {
    pub fn code(&self) -> i32 {
        match self {
            LoadError::NullConfig => -1,
            LoadError::EmptyId => -2,
            LoadError::NoSteps => -3,
            LoadError::StepLoad => -4,
            LoadError::TransitionLoad => -5,
            LoadError::Validation => -6,
            LoadError::AlreadyLoaded => -7,
        }
    }
}

/// Reasons a single step or transition rejects its config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigLoadError {
    #[error("config is missing")]
    NullConfig,

    #[error("config contains a blank id")]
    EmptyId,

    #[error("config failed validation")]
    InvalidConfig,
}

impl ConfigLoadError {
    pub fn code(&self) -> i32 {
        match self {
            ConfigLoadError::NullConfig => -1,
            ConfigLoadError::EmptyId => -2,
            ConfigLoadError::InvalidConfig => -3,
        }
    }
}

/// Reasons a running (or not yet runnable) sequence aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("failed to start, sequence not ready")]
    NotReady,

    #[error("sequence missing current step")]
    MissingCurrentStep,

    #[error("sequence aborted on step error")]
    StepAborted,

    #[error("sequence missing transition for step")]
    NoTransitions,

    #[error("sequence has no active transition for step")]
    NoActiveTransition,

    #[error("sequence missing step from transition")]
    MissingTargetStep,

    #[error("unhandled fault aborted sequence")]
    Fault,
}

impl AbortReason {
    pub fn code(&self) -> i32 {
        match self {
            AbortReason::NotReady => -1,
            AbortReason::MissingCurrentStep => -2,
            AbortReason::StepAborted => -3,
            AbortReason::NoTransitions => -4,
            AbortReason::NoActiveTransition => -5,
            AbortReason::MissingTargetStep => -6,
            AbortReason::Fault => -7,
        }
    }
}

/// Final outcome of `TaskSequence::execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Completed,
    Cancelled,
    Aborted(AbortReason),
}

impl ExecuteOutcome {
    /// 1 on success, 0 when cancelled, the abort reason's negative code otherwise
    pub fn code(&self) -> i32 {
        match self {
            ExecuteOutcome::Completed => 1,
            ExecuteOutcome::Cancelled => 0,
            ExecuteOutcome::Aborted(reason) => reason.code(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecuteOutcome::Completed)
    }
}

/// Failure raised by concrete step logic
///
/// `Cancelled` is the cooperative cancellation fault: the base step contract
/// maps it to the cancelled outcome, exactly like returning
/// `StepOutcome::Cancelled`. Anything else is a fault and aborts the step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step cancelled")]
    Cancelled,

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl StepError {
    pub fn fault(msg: impl Into<String>) -> Self {
        StepError::Fault(anyhow::anyhow!(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_negative() {
        let reasons = [
            AbortReason::NotReady,
            AbortReason::MissingCurrentStep,
            AbortReason::StepAborted,
            AbortReason::NoTransitions,
            AbortReason::NoActiveTransition,
            AbortReason::MissingTargetStep,
            AbortReason::Fault,
        ];
        let mut codes: Vec<i32> = reasons.iter().map(|r| r.code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());

        assert_eq!(ExecuteOutcome::Completed.code(), 1);
        assert_eq!(ExecuteOutcome::Cancelled.code(), 0);
        assert_eq!(ExecuteOutcome::Aborted(AbortReason::Fault).code(), -7);
    }

    #[test]
    fn load_error_codes_follow_load_order() {
        assert_eq!(LoadError::NullConfig.code(), -1);
        assert_eq!(LoadError::Validation.code(), -6);
        assert_eq!(LoadError::AlreadyLoaded.code(), -7);
    }
}
