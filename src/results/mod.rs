//! Result reporting
//!
//! Structured entries recorded while a sequence loads, validates and runs,
//! and the shared sink that orders them and notifies an external observer.

pub mod entry;
pub mod sink;

pub use entry::{Disposition, EntryKind, EntryType, ObjectType, Phase, ResultEntry, UnknownName};
pub use sink::{NotifyFilter, PhaseScope, ResultObserver, ResultSink};
