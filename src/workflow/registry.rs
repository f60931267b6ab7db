//! Step and transition type registry
//!
//! Turns the string type names found in configs into fresh runtime instances.
//! Several independently owned factories can back one registry; they are
//! consulted in registration order and the winner for each name is cached.
//! The factory list is fixed once the registry is built, and the caches are
//! swapped atomically, so resolution is lock-free and safe from any thread.

use crate::runtime::step::Step;
use crate::runtime::transition::Transition;
use arc_swap::ArcSwap;
use std::{collections::HashMap, fmt, sync::Arc};

/// Id under which the built-in factory is registered
pub const BUILTIN_FACTORY_ID: &str = "builtin";

/// A source of concrete step and transition implementations
///
/// Returns `None` for names it does not provide. Names arrive trimmed but
/// with their original casing.
pub trait SequenceFactory: Send + Sync {
    fn create_step(&self, type_name: &str) -> Option<Box<dyn Step>>;

    fn create_transition(&self, type_name: &str) -> Option<Box<dyn Transition>>;
}

type StepCtor = Arc<dyn Fn() -> Box<dyn Step> + Send + Sync>;
type TransitionCtor = Arc<dyn Fn() -> Box<dyn Transition> + Send + Sync>;

/// Explicit name → constructor table, matched case-insensitively
#[derive(Default, Clone)]
pub struct TypeFactory {
    steps: HashMap<String, StepCtor>,
    transitions: HashMap<String, TransitionCtor>,
}

impl fmt::Debug for TypeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps: Vec<&String> = self.steps.keys().collect();
        let mut transitions: Vec<&String> = self.transitions.keys().collect();
        steps.sort();
        transitions.sort();
        f.debug_struct("TypeFactory")
            .field("steps", &steps)
            .field("transitions", &transitions)
            .finish()
    }
}

impl TypeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_step<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Step> + Send + Sync + 'static,
    {
        self.steps.insert(cache_key(name), Arc::new(ctor));
        self
    }

    pub fn register_transition<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Transition> + Send + Sync + 'static,
    {
        self.transitions.insert(cache_key(name), Arc::new(ctor));
        self
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn transition_names(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }
}

impl SequenceFactory for TypeFactory {
    fn create_step(&self, type_name: &str) -> Option<Box<dyn Step>> {
        self.steps.get(&cache_key(type_name)).map(|ctor| ctor())
    }

    fn create_transition(&self, type_name: &str) -> Option<Box<dyn Transition>> {
        self.transitions.get(&cache_key(type_name)).map(|ctor| ctor())
    }
}

/// Process-wide resolver over one or more factories
///
/// Build it once at startup and share it behind an `Arc`.
pub struct TypeRegistry {
    factories: Vec<(String, Arc<dyn SequenceFactory>)>,
    /// Key: lowercase type name, Value: id of the factory that last built it
    step_cache: ArcSwap<HashMap<String, String>>,
    transition_cache: ArcSwap<HashMap<String, String>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("factories", &self.factory_ids())
            .field("cached_steps", &self.step_cache.load().len())
            .field("cached_transitions", &self.transition_cache.load().len())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry backed by the built-in factory only
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder with the built-in factory already registered
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            factories: vec![(BUILTIN_FACTORY_ID.to_string(), Arc::new(TypeFactory::builtin()))],
        }
    }

    pub fn factory_ids(&self) -> Vec<&str> {
        self.factories.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Construct a fresh step for `type_name`, or `None` if no factory provides it
    pub fn resolve_step(&self, type_name: &str) -> Option<Box<dyn Step>> {
        self.resolve("step", type_name, &self.step_cache, |factory, name| factory.create_step(name))
    }

    /// Construct a fresh transition for `type_name`, or `None` if no factory provides it
    pub fn resolve_transition(&self, type_name: &str) -> Option<Box<dyn Transition>> {
        self.resolve("transition", type_name, &self.transition_cache, |factory, name| {
            factory.create_transition(name)
        })
    }

    /// Factory id currently cached for a step type name
    pub fn cached_step_factory(&self, type_name: &str) -> Option<String> {
        self.step_cache.load().get(&cache_key(type_name)).cloned()
    }

    pub fn cached_transition_factory(&self, type_name: &str) -> Option<String> {
        self.transition_cache.load().get(&cache_key(type_name)).cloned()
    }

    fn resolve<T>(
        &self,
        kind: &str,
        type_name: &str,
        cache: &ArcSwap<HashMap<String, String>>,
        create: impl Fn(&dyn SequenceFactory, &str) -> Option<T>,
    ) -> Option<T> {
        let name = type_name.trim();
        if name.is_empty() {
            return None;
        }
        let key = cache_key(name);

        let cached_id = cache.load().get(&key).cloned();
        if let Some(cached_id) = cached_id {
            let hit = self
                .factories
                .iter()
                .find(|(id, _)| *id == cached_id)
                .and_then(|(_, factory)| create(factory.as_ref(), name));
            if hit.is_some() {
                tracing::trace!("Resolved {} type '{}' from cached factory '{}'", kind, name, cached_id);
                return hit;
            }

            tracing::debug!(
                "Cached factory '{}' no longer builds {} type '{}', evicting",
                cached_id,
                kind,
                name
            );
            cache.rcu(|current| {
                let mut next = HashMap::clone(current);
                if next.get(&key) == Some(&cached_id) {
                    next.remove(&key);
                }
                next
            });
        }

        for (id, factory) in &self.factories {
            if let Some(instance) = create(factory.as_ref(), name) {
                cache.rcu(|current| {
                    let mut next = HashMap::clone(current);
                    next.insert(key.clone(), id.clone());
                    next
                });
                tracing::debug!("🔎 Resolved {} type '{}' from factory '{}'", kind, name, id);
                return Some(instance);
            }
        }

        tracing::debug!("No factory provides {} type '{}'", kind, name);
        None
    }
}

/// Collects factories before the registry is frozen
pub struct TypeRegistryBuilder {
    factories: Vec<(String, Arc<dyn SequenceFactory>)>,
}

impl TypeRegistryBuilder {
    /// Append a factory; earlier factories win name clashes.
    /// Re-using an id replaces that factory in place.
    pub fn with_factory(mut self, id: impl Into<String>, factory: Arc<dyn SequenceFactory>) -> Self {
        let id = id.into();
        match self.factories.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                tracing::warn!("⚠️ Replacing type factory '{}'", id);
                slot.1 = factory;
            }
            None => self.factories.push((id, factory)),
        }
        self
    }

    pub fn build(self) -> TypeRegistry {
        tracing::info!("📚 Type registry ready with {} factories", self.factories.len());
        TypeRegistry {
            factories: self.factories,
            step_cache: ArcSwap::from_pointee(HashMap::new()),
            transition_cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }
}

fn cache_key(type_name: &str) -> String {
    type_name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::builtin::{NoActionStep, ALWAYS_TRUE, NO_ACTION, SEQUENCE_START};

    #[test]
    fn builtin_types_resolve_case_insensitively() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.resolve_step("sequencestart").map(|s| s.type_name()), Some(SEQUENCE_START));
        assert_eq!(registry.resolve_step("  NOACTION ").map(|s| s.type_name()), Some(NO_ACTION));
        assert!(registry.resolve_transition("alwaysTrue").is_some());
        assert_eq!(registry.cached_transition_factory(ALWAYS_TRUE).as_deref(), Some(BUILTIN_FACTORY_ID));
    }

    #[test]
    fn blank_and_unknown_names_fail_without_caching() {
        let registry = TypeRegistry::new();
        assert!(registry.resolve_step("").is_none());
        assert!(registry.resolve_step("   ").is_none());
        assert!(registry.resolve_step("Teleport").is_none());
        assert!(registry.cached_step_factory("Teleport").is_none());
    }

    #[test]
    fn earlier_factory_wins() {
        let mut shadow = TypeFactory::new();
        shadow.register_step("Custom", || Box::new(NoActionStep));
        let mut other = TypeFactory::new();
        other.register_step("custom", || Box::new(NoActionStep));

        let registry = TypeRegistry::builder()
            .with_factory("first", Arc::new(shadow))
            .with_factory("second", Arc::new(other))
            .build();
        assert!(registry.resolve_step("CUSTOM").is_some());
        assert_eq!(registry.cached_step_factory("custom").as_deref(), Some("first"));
        assert_eq!(registry.factory_ids(), vec![BUILTIN_FACTORY_ID, "first", "second"]);
    }
}
