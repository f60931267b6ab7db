//! Sequence definitions
//!
//! Serializable sequence graphs, the JSON source that reads them, and the
//! type registry that maps their type names to implementations.

pub mod registry;
pub mod source;
pub mod types;

pub use registry::{SequenceFactory, TypeFactory, TypeRegistry, TypeRegistryBuilder};
pub use types::{SequenceConfig, StepConfig, TransitionConfig};
