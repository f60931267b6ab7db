//! Cross-entity graph validation
//!
//! Runs after every step and transition has been built from config. Each
//! check reports independently, so one pass surfaces every problem.

use crate::results::ObjectType;
use crate::runtime::step::{StepState, TaskStep};
use crate::runtime::transition::{TaskTransition, TransitionState};
use crate::workflow::types::SequenceConfig;
use petgraph::{graph::DiGraph, visit::Dfs};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// One failed structural check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("Sequence config contains blank sequence id.")]
    BlankSequenceId,

    #[error("Sequence config contains no steps.")]
    NoStepConfigs { sequence_id: Uuid },

    #[error("Sequence contains no steps.")]
    NoSteps { sequence_id: Uuid },

    #[error("Sequence has no start step.")]
    NoStartStep { sequence_id: Uuid },

    #[error("Sequence has {count} start steps, exactly one is required.")]
    MultipleStartSteps { step_id: Uuid, count: usize },

    #[error("Step has no transitions and is not a terminal step.")]
    NoOutgoingTransition { step_id: Uuid },

    #[error("Transition source step {source_step_id} does not exist.")]
    MissingSourceStep { transition_id: Uuid, source_step_id: Uuid },

    #[error("Transition target step {target_step_id} does not exist.")]
    MissingTargetStep { transition_id: Uuid, target_step_id: Uuid },

    #[error("Step is not ready, state is {state}.")]
    StepNotReady { step_id: Uuid, state: StepState },

    #[error("Transition is not ready, state is {state}.")]
    TransitionNotReady { transition_id: Uuid, state: TransitionState },

    #[error("No terminal step is reachable from the start step.")]
    NoReachableTerminal { start_step_id: Uuid },
}

impl ValidationIssue {
    /// Entity the issue is reported against
    pub fn object(&self) -> (ObjectType, Uuid) {
        match self {
            ValidationIssue::BlankSequenceId => (ObjectType::SequenceConfig, Uuid::nil()),
            ValidationIssue::NoStepConfigs { sequence_id } => (ObjectType::SequenceConfig, *sequence_id),
            ValidationIssue::NoSteps { sequence_id } | ValidationIssue::NoStartStep { sequence_id } => {
                (ObjectType::Sequence, *sequence_id)
            }
            ValidationIssue::MultipleStartSteps { step_id, .. }
            | ValidationIssue::NoOutgoingTransition { step_id }
            | ValidationIssue::StepNotReady { step_id, .. } => (ObjectType::Step, *step_id),
            ValidationIssue::NoReachableTerminal { start_step_id } => (ObjectType::Step, *start_step_id),
            ValidationIssue::MissingSourceStep { transition_id, .. }
            | ValidationIssue::MissingTargetStep { transition_id, .. }
            | ValidationIssue::TransitionNotReady { transition_id, .. } => (ObjectType::Transition, *transition_id),
        }
    }
}

/// Check a loaded graph, returning every issue found
pub fn validate(config: &SequenceConfig, steps: &[TaskStep], transitions: &[TaskTransition]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.id.is_nil() {
        issues.push(ValidationIssue::BlankSequenceId);
    }
    if config.steps.is_empty() {
        issues.push(ValidationIssue::NoStepConfigs { sequence_id: config.id });
    }

    let start_steps: Vec<&TaskStep> = steps.iter().filter(|s| s.is_sequence_start()).collect();
    if steps.is_empty() {
        issues.push(ValidationIssue::NoSteps { sequence_id: config.id });
    } else if start_steps.is_empty() {
        issues.push(ValidationIssue::NoStartStep { sequence_id: config.id });
    } else if start_steps.len() > 1 {
        for step in &start_steps {
            issues.push(ValidationIssue::MultipleStartSteps { step_id: step.id(), count: start_steps.len() });
        }
    }

    let sources: HashSet<Uuid> = transitions.iter().map(|t| t.step_id()).collect();
    for step in steps {
        if !step.is_terminal_step() && !sources.contains(&step.id()) {
            issues.push(ValidationIssue::NoOutgoingTransition { step_id: step.id() });
        }
    }

    let step_ids: HashSet<Uuid> = steps.iter().map(|s| s.id()).collect();
    for transition in transitions {
        if !step_ids.contains(&transition.step_id()) {
            issues.push(ValidationIssue::MissingSourceStep {
                transition_id: transition.id(),
                source_step_id: transition.step_id(),
            });
        }
        if !step_ids.contains(&transition.next_step_id()) {
            issues.push(ValidationIssue::MissingTargetStep {
                transition_id: transition.id(),
                target_step_id: transition.next_step_id(),
            });
        }
    }

    for step in steps {
        if step.state() != StepState::Ready {
            issues.push(ValidationIssue::StepNotReady { step_id: step.id(), state: step.state() });
        }
    }
    for transition in transitions {
        if transition.state() != TransitionState::Ready {
            issues.push(ValidationIssue::TransitionNotReady {
                transition_id: transition.id(),
                state: transition.state(),
            });
        }
    }

    if let [start] = start_steps.as_slice() {
        if !terminal_reachable(start.id(), steps, transitions) {
            issues.push(ValidationIssue::NoReachableTerminal { start_step_id: start.id() });
        }
    }

    issues
}

/// Depth-first search over the step graph from `start_id`
fn terminal_reachable(start_id: Uuid, steps: &[TaskStep], transitions: &[TaskTransition]) -> bool {
    let mut graph = DiGraph::<Uuid, ()>::new();
    let nodes: HashMap<Uuid, _> = steps.iter().map(|s| (s.id(), graph.add_node(s.id()))).collect();

    for transition in transitions {
        if let (Some(&from), Some(&to)) = (nodes.get(&transition.step_id()), nodes.get(&transition.next_step_id())) {
            graph.add_edge(from, to, ());
        }
    }

    let terminals: HashSet<Uuid> = steps.iter().filter(|s| s.is_terminal_step()).map(|s| s.id()).collect();
    let Some(&start) = nodes.get(&start_id) else {
        return false;
    };

    let mut dfs = Dfs::new(&graph, start);
    while let Some(node) = dfs.next(&graph) {
        if terminals.contains(&graph[node]) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultSink;
    use crate::workflow::registry::TypeRegistry;
    use std::sync::Arc;

    fn build(config: &SequenceConfig) -> (Vec<TaskStep>, Vec<TaskTransition>) {
        let registry = TypeRegistry::new();
        let sink = Arc::new(ResultSink::default());
        let steps = config
            .steps
            .iter()
            .map(|c| {
                let mut step = TaskStep::new(registry.resolve_step(&c.step_type).unwrap());
                let _ = step.load(c, Arc::clone(&sink));
                step
            })
            .collect();
        let transitions = config
            .transitions
            .iter()
            .map(|c| {
                let mut transition = TaskTransition::new(registry.resolve_transition(&c.transition_type).unwrap());
                let _ = transition.load(c, &sink);
                transition
            })
            .collect();
        (steps, transitions)
    }

    #[test]
    fn linear_graph_is_valid() {
        let mut cfg = SequenceConfig::new("ok");
        let start = cfg.add_step("SequenceStart").id;
        let end = cfg.add_step("NoAction").terminal(true).id;
        cfg.add_transition("AlwaysTrue", start, end);

        let (steps, transitions) = build(&cfg);
        assert_eq!(validate(&cfg, &steps, &transitions), vec![]);
    }

    #[test]
    fn duplicate_start_steps_are_each_reported() {
        let mut cfg = SequenceConfig::new("two starts");
        cfg.add_step("SequenceStart").terminal(true);
        cfg.add_step("SequenceStart").terminal(true);

        let (steps, transitions) = build(&cfg);
        let issues = validate(&cfg, &steps, &transitions);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| matches!(i, ValidationIssue::MultipleStartSteps { count: 2, .. })));
    }

    #[test]
    fn dangling_edges_and_dead_ends_accumulate() {
        let mut cfg = SequenceConfig::new("broken");
        let start = cfg.add_step("SequenceStart").id;
        let middle = cfg.add_step("NoAction").id;
        let ghost = Uuid::new_v4();
        let dangling = cfg.add_transition("AlwaysTrue", start, ghost).id;
        cfg.add_transition("AlwaysTrue", start, middle);

        let (steps, transitions) = build(&cfg);
        let issues = validate(&cfg, &steps, &transitions);
        assert!(issues.contains(&ValidationIssue::MissingTargetStep { transition_id: dangling, target_step_id: ghost }));
        assert!(issues.contains(&ValidationIssue::NoOutgoingTransition { step_id: middle }));
        assert!(issues.contains(&ValidationIssue::NoReachableTerminal { start_step_id: start }));
        assert_eq!(
            ValidationIssue::MissingTargetStep { transition_id: dangling, target_step_id: ghost }.object(),
            (ObjectType::Transition, dangling)
        );
    }

    #[test]
    fn unreachable_terminal_is_flagged() {
        let mut cfg = SequenceConfig::new("island");
        let start = cfg.add_step("SequenceStart").id;
        let looping = cfg.add_step("NoAction").id;
        cfg.add_step("NoAction").terminal(true);
        cfg.add_transition("AlwaysTrue", start, looping);
        cfg.add_transition("AlwaysTrue", looping, start);

        let (steps, transitions) = build(&cfg);
        assert_eq!(
            validate(&cfg, &steps, &transitions),
            vec![ValidationIssue::NoReachableTerminal { start_step_id: start }]
        );
    }
}
