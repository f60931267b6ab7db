//! Append-only, thread-safe result log
//!
//! Appending an entry and assigning its display order happen under one lock,
//! so ordinals stay gap-free and strictly increasing across concurrent
//! producers. Qualifying entries are forwarded to an optional observer on a
//! background worker; the producer never waits on it.

use crate::notify::spawn_dispatcher;
use crate::results::entry::{Disposition, EntryKind, EntryType, ObjectType, Phase, ResultEntry};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// External consumer of result entries
///
/// Called from a background worker, never from the producing thread.
/// Returned errors are swallowed.
pub trait ResultObserver: Send + Sync + 'static {
    fn on_entry(&self, entry: &ResultEntry) -> anyhow::Result<()>;
}

impl<F> ResultObserver for F
where
    F: Fn(&ResultEntry) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_entry(&self, entry: &ResultEntry) -> anyhow::Result<()> {
        self(entry)
    }
}

/// Which entries are forwarded to the observer
///
/// An entry qualifies only if both its type and its phase are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyFilter {
    pub entry_types: HashSet<EntryType>,
    pub phases: HashSet<Phase>,
}

impl NotifyFilter {
    pub fn new(entry_types: impl IntoIterator<Item = EntryType>, phases: impl IntoIterator<Item = Phase>) -> Self {
        Self {
            entry_types: entry_types.into_iter().collect(),
            phases: phases.into_iter().collect(),
        }
    }

    pub fn allows(&self, entry: &ResultEntry) -> bool {
        self.phases.contains(&entry.phase) && self.entry_types.contains(&entry.entry_type())
    }
}

impl Default for NotifyFilter {
    /// Running phase, every entry type except state-change noise
    fn default() -> Self {
        Self::new(
            EntryType::ALL.into_iter().filter(|t| *t != EntryType::StateChange),
            [Phase::Running],
        )
    }
}

#[derive(Debug)]
struct SinkState {
    entries: Vec<ResultEntry>,
    last_display_order: u64,
    disposition: Disposition,
}

/// Shared result log owned by a `TaskSequence` and handed to its steps
pub struct ResultSink {
    state: Mutex<SinkState>,
    filter: NotifyFilter,
    observer: ArcSwapOption<UnboundedSender<ResultEntry>>,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("len", &self.len())
            .field("filter", &self.filter)
            .field("has_observer", &self.observer.load().is_some())
            .finish()
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new(NotifyFilter::default())
    }
}

impl ResultSink {
    pub fn new(filter: NotifyFilter) -> Self {
        Self {
            state: Mutex::new(SinkState {
                entries: Vec::new(),
                last_display_order: 0,
                disposition: Disposition::Unknown,
            }),
            filter,
            observer: ArcSwapOption::empty(),
        }
    }

    pub fn filter(&self) -> &NotifyFilter {
        &self.filter
    }

    /// Attach an observer, replacing any previous one
    pub fn subscribe<O: ResultObserver>(&self, observer: O) {
        let tx = spawn_dispatcher("result-observer", move |entry: ResultEntry| observer.on_entry(&entry));
        self.observer.store(Some(Arc::new(tx)));
    }

    pub fn unsubscribe(&self) {
        self.observer.store(None);
    }

    /// Append an entry, returning the display order it was given
    pub fn push(&self, mut entry: ResultEntry) -> u64 {
        let mut state = self.state.lock();
        state.last_display_order += 1;
        entry.display_order = state.last_display_order;

        if let EntryKind::OverallDisposition { disposition } = &entry.kind {
            state.disposition = *disposition;
        }

        // Forward under the lock so observers see entries in display order
        if self.filter.allows(&entry) {
            if let Some(tx) = &*self.observer.load() {
                if tx.send(entry.clone()).is_err() {
                    tracing::debug!("Result observer is gone, dropping notification");
                }
            }
        }

        let order = entry.display_order;
        state.entries.push(entry);
        order
    }

    pub fn add_start(&self, phase: Phase, obj_type: ObjectType, obj_id: Uuid) -> u64 {
        self.push(ResultEntry::new("Started", phase, obj_type, obj_id, EntryKind::Start))
    }

    pub fn add_end(&self, phase: Phase, obj_type: ObjectType, obj_id: Uuid) -> u64 {
        self.push(ResultEntry::new("Ended", phase, obj_type, obj_id, EntryKind::End))
    }

    pub fn add_error(&self, phase: Phase, message: impl Into<String>, obj_type: ObjectType, obj_id: Uuid) -> u64 {
        let message = message.into();
        tracing::warn!("❌ [{}] {} {}: {}", phase, obj_type, obj_id, message);
        self.push(
            ResultEntry::new("Error", phase, obj_type, obj_id, EntryKind::Error { message: message.clone() })
                .with_description(message),
        )
    }

    pub fn add_validation_error(&self, message: impl Into<String>, obj_type: ObjectType, obj_id: Uuid) -> u64 {
        let message = message.into();
        tracing::warn!("❌ [Validation] {} {}: {}", obj_type, obj_id, message);
        self.push(
            ResultEntry::new(
                "ValidationError",
                Phase::Validation,
                obj_type,
                obj_id,
                EntryKind::Error { message: message.clone() },
            )
            .with_description(message),
        )
    }

    pub fn add_cancellation(
        &self,
        phase: Phase,
        message: impl Into<String>,
        obj_type: ObjectType,
        obj_id: Uuid,
        source_type: impl Into<String>,
        source_id: impl Into<String>,
    ) -> u64 {
        let message = message.into();
        self.push(
            ResultEntry::new(
                "Cancellation",
                phase,
                obj_type,
                obj_id,
                EntryKind::Cancellation {
                    message: message.clone(),
                    source_type: source_type.into(),
                    source_id: source_id.into(),
                },
            )
            .with_description(message),
        )
    }

    pub fn add_disposition(&self, phase: Phase, obj_type: ObjectType, obj_id: Uuid, disposition: Disposition) -> u64 {
        self.push(ResultEntry::new(
            "Disposition",
            phase,
            obj_type,
            obj_id,
            EntryKind::Disposition { disposition },
        ))
    }

    pub fn add_overall_disposition(&self, obj_type: ObjectType, obj_id: Uuid, disposition: Disposition) -> u64 {
        self.push(ResultEntry::new(
            "Overall_Disposition",
            Phase::Running,
            obj_type,
            obj_id,
            EntryKind::OverallDisposition { disposition },
        ))
    }

    pub fn add_transition(
        &self,
        transition_id: Uuid,
        from_step_id: Uuid,
        to_step_id: Uuid,
        props: Option<HashMap<String, String>>,
    ) -> u64 {
        let mut entry = ResultEntry::new(
            "Transition",
            Phase::Running,
            ObjectType::Transition,
            transition_id,
            EntryKind::Transition { transition_id, from_step_id, to_step_id },
        );
        if let Some(props) = props {
            entry.parameters.extend(props);
        }
        self.push(entry)
    }

    pub fn add_state_change(
        &self,
        obj_type: ObjectType,
        obj_id: Uuid,
        old_state: impl Into<String>,
        new_state: impl Into<String>,
    ) -> u64 {
        let (old_state, new_state) = (old_state.into(), new_state.into());
        self.push(
            ResultEntry::new(
                "StateChange",
                Phase::NA,
                obj_type,
                obj_id,
                EntryKind::StateChange { old_state: old_state.clone(), new_state: new_state.clone() },
            )
            .with_parameter("oldstate", old_state)
            .with_parameter("newstate", new_state),
        )
    }

    pub fn add_step_action(
        &self,
        step_id: Uuid,
        name: impl Into<String>,
        data_type: impl Into<String>,
        data: impl Into<String>,
    ) -> u64 {
        self.push(ResultEntry::new(
            "StepAction",
            Phase::Running,
            ObjectType::Step,
            step_id,
            EntryKind::StepAction { name: name.into(), data_type: data_type.into(), data: data.into() },
        ))
    }

    /// Sequence-wide console output
    pub fn add_console(&self, message: impl Into<String>, is_error: bool) -> u64 {
        let message = message.into();
        self.push(
            ResultEntry::new(
                "Console",
                Phase::Running,
                ObjectType::Console,
                Uuid::nil(),
                EntryKind::Console { message: message.clone(), is_error },
            )
            .with_description(message),
        )
    }

    /// Console output attributed to a step
    pub fn add_step_console(&self, step_id: Uuid, message: impl Into<String>, is_error: bool) -> u64 {
        let message = message.into();
        self.push(
            ResultEntry::new(
                "StepConsole",
                Phase::Running,
                ObjectType::Step,
                step_id,
                EntryKind::Console { message: message.clone(), is_error },
            )
            .with_description(message),
        )
    }

    pub fn add_log(
        &self,
        message: impl Into<String>,
        severity: impl Into<String>,
        class: impl Into<String>,
        line_no: u32,
    ) -> u64 {
        let message = message.into();
        self.push(
            ResultEntry::new(
                "LogEntry",
                Phase::Running,
                ObjectType::Console,
                Uuid::nil(),
                EntryKind::Log {
                    severity: severity.into(),
                    class: class.into(),
                    line_no,
                    message: message.clone(),
                },
            )
            .with_description(message),
        )
    }

    pub fn add_user_action(
        &self,
        user_name: impl Into<String>,
        action_type: impl Into<String>,
        response: impl Into<String>,
        category: impl Into<String>,
    ) -> u64 {
        self.push(ResultEntry::new(
            "UserAction",
            Phase::Running,
            ObjectType::Console,
            Uuid::nil(),
            EntryKind::UserAction {
                user_name: user_name.into(),
                action_type: action_type.into(),
                category: category.into(),
                response: response.into(),
            },
        ))
    }

    /// Drop all recorded entries. The display-order counter keeps counting.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn entries(&self) -> Vec<ResultEntry> {
        self.state.lock().entries.clone()
    }

    pub fn entries_of(&self, entry_type: EntryType) -> Vec<ResultEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.entry_type() == entry_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_display_order(&self) -> u64 {
        self.state.lock().last_display_order
    }

    /// Last overall disposition recorded, `Unknown` until one is
    pub fn disposition(&self) -> Disposition {
        self.state.lock().disposition
    }

    pub fn to_log(&self) -> String {
        self.state.lock().entries.iter().map(ResultEntry::to_log_entry).collect()
    }
}

/// Bracket of Start/End entries for one phase of one object
///
/// The Start entry is written when the scope opens and the End entry when it
/// drops, so every exit path (early return, error, panic, a dropped future)
/// closes the bracket.
#[must_use = "the End entry is written when the scope is dropped"]
pub struct PhaseScope {
    sink: Arc<ResultSink>,
    phase: Phase,
    obj_type: ObjectType,
    obj_id: Uuid,
}

impl ResultSink {
    pub fn scope(self: &Arc<Self>, phase: Phase, obj_type: ObjectType, obj_id: Uuid) -> PhaseScope {
        self.add_start(phase, obj_type, obj_id);
        PhaseScope {
            sink: Arc::clone(self),
            phase,
            obj_type,
            obj_id,
        }
    }
}

impl Drop for PhaseScope {
    fn drop(&mut self) {
        self.sink.add_end(self.phase, self.obj_type, self.obj_id);
    }
}
