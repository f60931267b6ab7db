//! Sequence runtime
//!
//! Step and transition contracts, the built-in types, graph validation and
//! the engine that executes a loaded sequence.

pub mod builtin;
pub mod engine;
pub mod listener;
pub mod step;
pub mod transition;
pub mod validator;

pub use engine::TaskSequence;
pub use listener::{StateChange, StateListener};
pub use step::{Step, StepContext, StepOutcome, StepState, TaskStep};
pub use transition::{GuardResult, TaskTransition, Transition, TransitionState};
pub use validator::ValidationIssue;
