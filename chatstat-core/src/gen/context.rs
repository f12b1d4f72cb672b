//! Message context assembly.
//!
//! A transient read model over the chat: the message being processed
//! plus the nearest preceding eligible message and its stats. Built
//! fresh for each generation pass, never persisted.

use crate::chat::{MessageStats, MessageStore};
use crate::registry::{StatRegistry, StatScope};

/// Index of the most recent message eligible for stats.
pub fn last_eligible_index(store: &dyn MessageStore) -> Option<usize> {
    (0..store.len())
        .rev()
        .find(|&i| store.message(i).map(|m| m.is_eligible()).unwrap_or(false))
}

/// Index of the nearest eligible message strictly before `before`.
pub fn previous_eligible_index(store: &dyn MessageStore, before: usize) -> Option<usize> {
    (0..before.min(store.len()))
        .rev()
        .find(|&i| store.message(i).map(|m| m.is_eligible()).unwrap_or(false))
}

/// Distinct author names of non-system messages, in first-seen order.
pub fn participants(store: &dyn MessageStore) -> Vec<String> {
    let mut seen = Vec::new();
    for i in 0..store.len() {
        let Some(message) = store.message(i) else {
            continue;
        };
        if message.is_system {
            continue;
        }
        if !seen.contains(&message.name) {
            seen.push(message.name.clone());
        }
    }
    seen
}

/// Input to one generation pass.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// Index of the message being processed.
    pub index: usize,

    pub current_name: String,
    pub current_text: String,

    /// Nearest preceding eligible message, when one exists.
    pub previous_name: Option<String>,
    pub previous_text: Option<String>,

    /// The preceding message's stats, with every active stat defaulted
    /// for the given roster where no value was computed.
    pub previous_stats: MessageStats,
}

impl MessageContext {
    /// Build the context for `index`.
    ///
    /// Returns `None` when the index does not exist.
    pub fn build(
        store: &dyn MessageStore,
        registry: &StatRegistry,
        index: usize,
        roster: &[String],
    ) -> Option<Self> {
        let current = store.message(index)?;

        let previous_index = previous_eligible_index(store, index);
        let previous = previous_index.and_then(|i| store.message(i));

        let mut previous_stats = previous_index
            .and_then(|i| store.stats(i))
            .cloned()
            .unwrap_or_default();
        fill_defaults(&mut previous_stats, registry, roster);

        Some(Self {
            index,
            current_name: current.name.clone(),
            current_text: current.text().to_string(),
            previous_name: previous.map(|m| m.name.clone()),
            previous_text: previous.map(|m| m.text().to_string()),
            previous_stats,
        })
    }
}

/// Default every active stat for the roster and the scene where absent.
pub fn fill_defaults(stats: &mut MessageStats, registry: &StatRegistry, roster: &[String]) {
    for character in roster {
        for def in registry.active_stats(Some(StatScope::Character)) {
            if stats.character_value(character, &def.name).is_none() {
                stats.set_character_value(
                    character.as_str(),
                    def.name.as_str(),
                    def.default_value.as_str(),
                );
            }
        }
    }
    for def in registry.active_stats(Some(StatScope::Scene)) {
        if stats.scene_value(&def.name).is_none() {
            stats.set_scene_value(def.name.as_str(), def.default_value.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatLog, ChatMessage};
    use crate::registry::{StatDefinition, StatRegistry, StatScope};

    fn registry() -> StatRegistry {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("pose", StatScope::Character).with_order(0));
        registry.add_stat(StatDefinition::new("time", StatScope::Scene).with_order(0));
        registry
    }

    #[test]
    fn test_last_eligible_skips_system_and_bracketed() {
        let mut log = ChatLog::new();
        log.push(ChatMessage::new("Alice", "hello"));
        log.push(ChatMessage::new("Bob", "[OOC: afk]"));
        log.push(ChatMessage::system("scenario"));

        assert_eq!(last_eligible_index(&log), Some(0));
    }

    #[test]
    fn test_previous_eligible() {
        let mut log = ChatLog::new();
        log.push(ChatMessage::new("Alice", "one"));
        log.push(ChatMessage::system("notice"));
        log.push(ChatMessage::new("Bob", "two"));

        assert_eq!(previous_eligible_index(&log, 2), Some(0));
        assert_eq!(previous_eligible_index(&log, 0), None);
    }

    #[test]
    fn test_context_defaults_previous_stats() {
        let mut log = ChatLog::new();
        let first = log.push(ChatMessage::new("Alice", "hello"));
        log.push(ChatMessage::new("Bob", "hi"));

        let mut stats = MessageStats::new();
        stats.set_character_value("Alice", "pose", "sitting");
        log.set_stats(first, stats);

        let roster = vec!["Alice".to_string(), "Bob".to_string()];
        let ctx = MessageContext::build(&log, &registry(), 1, &roster).unwrap();

        assert_eq!(ctx.previous_name.as_deref(), Some("Alice"));
        // Computed value survives; missing ones pick up defaults.
        assert_eq!(
            ctx.previous_stats.character_value("Alice", "pose"),
            Some("sitting")
        );
        assert_eq!(
            ctx.previous_stats.character_value("Bob", "pose"),
            Some("unspecified")
        );
        assert_eq!(ctx.previous_stats.scene_value("time"), Some("unspecified"));
    }

    #[test]
    fn test_context_without_previous() {
        let mut log = ChatLog::new();
        log.push(ChatMessage::new("Alice", "hello"));

        let roster = vec!["Alice".to_string()];
        let ctx = MessageContext::build(&log, &registry(), 0, &roster).unwrap();

        assert!(ctx.previous_name.is_none());
        assert!(ctx.previous_text.is_none());
        assert_eq!(
            ctx.previous_stats.character_value("Alice", "pose"),
            Some("unspecified")
        );
    }

    #[test]
    fn test_context_missing_index() {
        let log = ChatLog::new();
        assert!(MessageContext::build(&log, &registry(), 5, &[]).is_none());
    }
}
