//! State-change listeners
//!
//! Steps report their state transitions through a hook attached by the owning
//! sequence. The hook is a channel into a background worker, so a slow
//! listener never stalls the step that changed state.

use crate::notify::spawn_dispatcher;
use crate::runtime::step::StepState;
use std::{collections::HashSet, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// A state transition of a step or of the sequence itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Step {
        step_id: Uuid,
        name: String,
        old_state: StepState,
        new_state: StepState,
    },
    Sequence {
        sequence_id: Uuid,
        old_state: StepState,
        new_state: StepState,
    },
}

impl StateChange {
    pub fn new_state(&self) -> StepState {
        match self {
            StateChange::Step { new_state, .. } | StateChange::Sequence { new_state, .. } => *new_state,
        }
    }
}

/// External handler for state changes, called from a background worker
pub trait StateListener: Send + Sync + 'static {
    fn on_state_change(&self, change: &StateChange) -> anyhow::Result<()>;
}

impl<F> StateListener for F
where
    F: Fn(&StateChange) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_state_change(&self, change: &StateChange) -> anyhow::Result<()> {
        self(change)
    }
}

/// Sending half handed to steps; dropping every clone stops the worker
pub(crate) type StateHook = UnboundedSender<StateChange>;

/// Start delivering to `listener`
///
/// Step changes are forwarded only when the new state is in `step_states`;
/// sequence changes are always forwarded.
pub(crate) fn spawn_listener(listener: Arc<dyn StateListener>, step_states: HashSet<StepState>) -> StateHook {
    spawn_dispatcher("state-listener", move |change: StateChange| {
        if let StateChange::Step { new_state, .. } = &change {
            if !step_states.contains(new_state) {
                return Ok(());
            }
        }
        listener.on_state_change(&change)
    })
}
