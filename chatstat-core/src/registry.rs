//! Stat definition registry.
//!
//! Holds the set of known stats for the current session: name, default
//! value, scope, dependencies, display order, and activation/manual flags.
//! Definitions come from stored configuration or the builtin table.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Whether a stat belongs to a character or to the scene as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatScope {
    Character,
    Scene,
}

/// A single stat definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatDefinition {
    /// Stable identifier. Never renamed in place; rename is remove + add.
    pub name: String,

    /// Human-facing label. Freely mutable.
    pub display_name: String,

    /// Value a stat holds before anything has been inferred.
    pub default_value: String,

    /// Names of stats that must be generated before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Display and generation order, ascending.
    pub order: i32,

    pub scope: StatScope,

    /// Inactive stats are skipped by queries and generation.
    pub is_active: bool,

    /// Manual stats are never sent to the generation endpoint.
    pub is_manual: bool,

    /// User-defined, as opposed to builtin.
    pub is_custom: bool,
}

impl StatDefinition {
    pub fn new(name: impl Into<String>, scope: StatScope) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            default_value: DEFAULT_VALUE.to_string(),
            dependencies: Vec::new(),
            order: 0,
            scope,
            is_active: true,
            is_manual: false,
            is_custom: true,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn manual(mut self) -> Self {
        self.is_manual = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// A definition must not name itself as a dependency.
    pub fn is_self_dependent(&self) -> bool {
        self.dependencies.iter().any(|d| d == &self.name)
    }
}

/// Value assigned to a stat before anything has been inferred.
pub const DEFAULT_VALUE: &str = "unspecified";

fn builtin(name: &str, scope: StatScope, order: i32) -> StatDefinition {
    let mut def = StatDefinition::new(name, scope).with_order(order);
    def.is_custom = false;
    def
}

lazy_static! {
    /// Builtin stat set, used when no stored configuration exists.
    static ref BUILTIN_STATS: Vec<StatDefinition> = vec![
        builtin("pose", StatScope::Character, 0),
        builtin("outfit", StatScope::Character, 1),
        builtin("location", StatScope::Character, 2)
            .with_dependencies(vec!["pose".to_string()]),
        builtin("mood", StatScope::Character, 3),
        builtin("time", StatScope::Scene, 0),
        builtin("weather", StatScope::Scene, 1),
    ];
}

/// Notification fired when the definition set changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    StatAdded(String),
    StatRemoved(String),
}

type Listener = Box<dyn Fn(&RegistryEvent) + Send + Sync>;

/// The set of known stat definitions for one chat session.
pub struct StatRegistry {
    defs: Vec<StatDefinition>,
    listeners: Vec<Listener>,
}

impl StatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Create a registry seeded with the builtin stat set.
    pub fn with_builtin_defaults() -> Self {
        Self {
            defs: BUILTIN_STATS.clone(),
            listeners: Vec::new(),
        }
    }

    /// Create a registry from stored definitions.
    ///
    /// Definitions that violate the self-dependency invariant are dropped
    /// with a warning rather than poisoning the session.
    pub fn from_definitions(defs: Vec<StatDefinition>) -> Self {
        let mut registry = Self::new();
        for def in defs {
            if def.is_self_dependent() {
                warn!(stat = %def.name, "dropping self-dependent stat definition");
                continue;
            }
            if registry.stat_entry(&def.name).is_some() {
                warn!(stat = %def.name, "dropping duplicate stat definition");
                continue;
            }
            registry.defs.push(def);
        }
        registry
    }

    /// Look up a definition by name.
    pub fn stat_entry(&self, name: &str) -> Option<&StatDefinition> {
        self.defs.iter().find(|d| d.name == name)
    }

    /// All definitions, ascending by declared order.
    ///
    /// `scope = None` returns all scopes. Equal orders keep insertion order.
    pub fn all_stats(&self, scope: Option<StatScope>) -> Vec<&StatDefinition> {
        let mut stats: Vec<&StatDefinition> = self
            .defs
            .iter()
            .filter(|d| scope.map(|s| d.scope == s).unwrap_or(true))
            .collect();
        stats.sort_by_key(|d| d.order);
        stats
    }

    /// Active definitions, same ordering as [`all_stats`](Self::all_stats).
    pub fn active_stats(&self, scope: Option<StatScope>) -> Vec<&StatDefinition> {
        let mut stats: Vec<&StatDefinition> = self
            .defs
            .iter()
            .filter(|d| d.is_active)
            .filter(|d| scope.map(|s| d.scope == s).unwrap_or(true))
            .collect();
        stats.sort_by_key(|d| d.order);
        stats
    }

    /// Add a definition.
    ///
    /// Returns false without mutating when a definition with the same name
    /// already exists or the definition depends on itself.
    pub fn add_stat(&mut self, def: StatDefinition) -> bool {
        if self.stat_entry(&def.name).is_some() {
            return false;
        }
        if def.is_self_dependent() {
            warn!(stat = %def.name, "rejecting self-dependent stat definition");
            return false;
        }
        let event = RegistryEvent::StatAdded(def.name.clone());
        self.defs.push(def);
        self.notify(&event);
        true
    }

    /// Remove a definition by name. Returns false when not found.
    pub fn remove_stat(&mut self, name: &str) -> bool {
        let Some(pos) = self.defs.iter().position(|d| d.name == name) else {
            return false;
        };
        self.defs.remove(pos);
        self.notify(&RegistryEvent::StatRemoved(name.to_string()));
        true
    }

    /// Toggle whether a stat participates in queries and generation.
    pub fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.defs.iter_mut().find(|d| d.name == name) {
            Some(def) => {
                def.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Toggle whether a stat is excluded from automatic generation.
    pub fn set_manual(&mut self, name: &str, manual: bool) -> bool {
        match self.defs.iter_mut().find(|d| d.name == name) {
            Some(def) => {
                def.is_manual = manual;
                true
            }
            None => false,
        }
    }

    /// Change a stat's display label. The stat name itself is immutable.
    pub fn set_display_name(&mut self, name: &str, display_name: impl Into<String>) -> bool {
        match self.defs.iter_mut().find(|d| d.name == name) {
            Some(def) => {
                def.display_name = display_name.into();
                true
            }
            None => false,
        }
    }

    /// Subscribe to definition-set changes.
    ///
    /// Listeners run synchronously on add/remove; the session layer uses
    /// this to persist the updated set.
    pub fn subscribe(&mut self, listener: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// The raw definition list, in insertion order, for persistence.
    pub fn definitions(&self) -> &[StatDefinition] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    fn notify(&self, event: &RegistryEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for StatRegistry {
    fn default() -> Self {
        Self::with_builtin_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_builtin_defaults() {
        let registry = StatRegistry::with_builtin_defaults();
        assert!(registry.stat_entry("pose").is_some());
        assert!(registry.stat_entry("weather").is_some());
        assert_eq!(
            registry.stat_entry("location").unwrap().dependencies,
            vec!["pose".to_string()]
        );
        assert!(!registry.stat_entry("pose").unwrap().is_custom);
    }

    #[test]
    fn test_all_stats_sorted_by_order() {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("b", StatScope::Character).with_order(5));
        registry.add_stat(StatDefinition::new("a", StatScope::Character).with_order(1));
        registry.add_stat(StatDefinition::new("c", StatScope::Scene).with_order(3));

        let names: Vec<&str> = registry
            .all_stats(None)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c", "b"]);

        let character_only: Vec<&str> = registry
            .all_stats(Some(StatScope::Character))
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(character_only, vec!["a", "b"]);
    }

    #[test]
    fn test_equal_orders_keep_insertion_order() {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("first", StatScope::Character).with_order(1));
        registry.add_stat(StatDefinition::new("second", StatScope::Character).with_order(1));

        let names: Vec<&str> = registry
            .all_stats(None)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_active_stats_filters() {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("on", StatScope::Character).with_order(0));
        registry.add_stat(
            StatDefinition::new("off", StatScope::Character)
                .with_order(1)
                .inactive(),
        );

        let names: Vec<&str> = registry
            .active_stats(None)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["on"]);
    }

    #[test]
    fn test_add_duplicate_fails() {
        let mut registry = StatRegistry::new();
        assert!(registry.add_stat(StatDefinition::new("pose", StatScope::Character)));
        assert!(!registry.add_stat(StatDefinition::new("pose", StatScope::Character)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_self_dependent_fails() {
        let mut registry = StatRegistry::new();
        let def = StatDefinition::new("mood", StatScope::Character)
            .with_dependencies(vec!["mood".to_string()]);
        assert!(!registry.add_stat(def));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_stat() {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("pose", StatScope::Character));
        assert!(registry.remove_stat("pose"));
        assert!(!registry.remove_stat("pose"));
    }

    #[test]
    fn test_listeners_fire_on_add_and_remove() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();

        let mut registry = StatRegistry::new();
        registry.subscribe(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        registry.add_stat(StatDefinition::new("pose", StatScope::Character));
        registry.remove_stat("pose");
        // Failed operations do not notify.
        registry.remove_stat("pose");

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_display_name_mutable_name_not() {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("pose", StatScope::Character));
        assert!(registry.set_display_name("pose", "Pose / Posture"));
        assert_eq!(
            registry.stat_entry("pose").unwrap().display_name,
            "Pose / Posture"
        );
        assert_eq!(registry.stat_entry("pose").unwrap().name, "pose");
    }

    #[test]
    fn test_from_definitions_drops_invalid() {
        let defs = vec![
            StatDefinition::new("pose", StatScope::Character),
            StatDefinition::new("pose", StatScope::Character),
            StatDefinition::new("loop", StatScope::Character)
                .with_dependencies(vec!["loop".to_string()]),
        ];
        let registry = StatRegistry::from_definitions(defs);
        assert_eq!(registry.len(), 1);
    }
}
