//! taskseq: pluggable sequential workflow engine
//!
//! A sequence is a directed graph of steps joined by guarded transitions. It
//! is loaded from a declarative config, validated, and then executed one step
//! at a time until a terminal step completes, the run is cancelled, or an
//! error aborts it. Everything that happens is recorded as structured result
//! entries.

pub mod config;
pub mod errors;
mod notify;
pub mod results;
pub mod runtime;
pub mod workflow;

pub use config::EngineConfig;
pub use errors::{AbortReason, ConfigLoadError, ExecuteOutcome, LoadError, StepError};
pub use results::{Disposition, EntryType, ObjectType, Phase, ResultEntry, ResultSink};
pub use runtime::{StepState, TaskSequence};
pub use workflow::{SequenceConfig, StepConfig, TransitionConfig, TypeRegistry};
pub use tokio_util::sync::CancellationToken;
