//! Sequence configuration model
//!
//! Serializable descriptors for a sequence graph: steps, guarded transitions
//! and their string parameters. These describe the graph only; runtime state
//! lives in `runtime::TaskSequence` and the objects it builds from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A complete sequence definition
///
/// Steps and transitions reference each other by id. A nil id means "unset"
/// and is rejected at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub display_order: i32,
    pub parameters: HashMap<String, String>,
    pub steps: Vec<StepConfig>,
    pub transitions: Vec<TransitionConfig>,
}

/// A single step in the sequence graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub display_order: i32,
    /// Registry key, matched case-insensitively (e.g. "SequenceStart", "Delay")
    pub step_type: String,
    /// Successful completion of a terminal step ends the sequence,
    /// regardless of any outgoing transitions
    pub is_terminal_step: bool,
    pub parameters: HashMap<String, String>,
}

/// A directed, guarded edge from `step_id` to `next_step_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Evaluation priority among the source step's transitions (ascending)
    pub display_order: i32,
    /// Registry key, matched case-insensitively (e.g. "AlwaysTrue")
    pub transition_type: String,
    pub step_id: Uuid,
    pub next_step_id: Uuid,
    pub parameters: HashMap<String, String>,
}

impl SequenceConfig {
    /// Create an empty sequence with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a step of the given type with a fresh id and the next display order
    pub fn add_step(&mut self, step_type: impl Into<String>) -> &mut StepConfig {
        let display_order = next_display_order(self.steps.iter().map(|s| s.display_order));
        self.steps.push(StepConfig {
            id: Uuid::new_v4(),
            display_order,
            step_type: step_type.into(),
            ..Default::default()
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Append a transition between two steps with a fresh id and the next display order
    pub fn add_transition(
        &mut self,
        transition_type: impl Into<String>,
        source_step_id: Uuid,
        target_step_id: Uuid,
    ) -> &mut TransitionConfig {
        let display_order = next_display_order(self.transitions.iter().map(|t| t.display_order));
        self.transitions.push(TransitionConfig {
            id: Uuid::new_v4(),
            display_order,
            transition_type: transition_type.into(),
            step_id: source_step_id,
            next_step_id: target_step_id,
            ..Default::default()
        });
        let last = self.transitions.len() - 1;
        &mut self.transitions[last]
    }

    pub fn step(&self, id: Uuid) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn transition(&self, id: Uuid) -> Option<&TransitionConfig> {
        self.transitions.iter().find(|t| t.id == id)
    }
}

impl StepConfig {
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn described(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    pub fn terminal(&mut self, is_terminal: bool) -> &mut Self {
        self.is_terminal_step = is_terminal;
        self
    }

    pub fn with_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

impl TransitionConfig {
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn with_display_order(&mut self, display_order: i32) -> &mut Self {
        self.display_order = display_order;
        self
    }

    pub fn with_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// One past the current maximum, or 1 for an empty list
fn next_display_order(existing: impl Iterator<Item = i32>) -> i32 {
    existing.max().map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_assign_ids_and_display_orders() {
        let mut cfg = SequenceConfig::new("demo");
        assert!(!cfg.id.is_nil());

        let a = cfg.add_step("SequenceStart").named("start").id;
        let b = cfg.add_step("NoAction").terminal(true).id;
        assert_ne!(a, b);
        assert_eq!(cfg.steps[0].display_order, 1);
        assert_eq!(cfg.steps[1].display_order, 2);
        assert!(cfg.step(b).unwrap().is_terminal_step);

        let t = cfg.add_transition("AlwaysTrue", a, b).id;
        let tr = cfg.transition(t).unwrap();
        assert_eq!(tr.display_order, 1);
        assert_eq!((tr.step_id, tr.next_step_id), (a, b));
    }

    #[test]
    fn display_order_follows_the_maximum_not_the_count() {
        let mut cfg = SequenceConfig::new("demo");
        cfg.add_step("NoAction").display_order = 10;
        assert_eq!(cfg.add_step("NoAction").display_order, 11);
    }

    #[test]
    fn display_order_saturates_at_the_top_of_the_range() {
        let mut cfg = SequenceConfig::new("demo");
        cfg.add_step("NoAction").display_order = i32::MAX;
        assert_eq!(cfg.add_step("NoAction").display_order, i32::MAX);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let cfg: SequenceConfig = serde_json::from_str(r#"{ "name": "partial" }"#).unwrap();
        assert!(cfg.id.is_nil());
        assert!(cfg.steps.is_empty());
        assert_eq!(cfg.name, "partial");
    }
}
