//! Chat message and stat record model.
//!
//! Stats are attached per message, per swipe. A `None` entry for a
//! character means no stats have been computed for that character at
//! that point in history, which is distinct from an empty record.
//!
//! The orchestrator never touches the chat array directly; it goes
//! through the [`MessageStore`] accessor pair (`stats`/`set_stats`),
//! with [`ChatLog`] as the in-memory implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stat name to value, for one character or the scene.
pub type StatValues = BTreeMap<String, String>;

/// Key the scene record lives under. One chat tracks one scene.
pub const SCENE_KEY: &str = "scene";

/// The full stat snapshot for one message variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    #[serde(default)]
    pub characters: BTreeMap<String, Option<StatValues>>,
    #[serde(default)]
    pub scenes: BTreeMap<String, Option<StatValues>>,
}

impl MessageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `stat` for `character`, if computed.
    pub fn character_value(&self, character: &str, stat: &str) -> Option<&str> {
        self.characters
            .get(character)
            .and_then(|values| values.as_ref())
            .and_then(|values| values.get(stat))
            .map(|v| v.as_str())
    }

    /// Set the value of `stat` for `character`, creating the record.
    pub fn set_character_value(
        &mut self,
        character: impl Into<String>,
        stat: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.characters
            .entry(character.into())
            .or_insert_with(|| Some(StatValues::new()))
            .get_or_insert_with(StatValues::new)
            .insert(stat.into(), value.into());
    }

    /// The value of a scene-scope `stat`, if computed.
    pub fn scene_value(&self, stat: &str) -> Option<&str> {
        self.scenes
            .get(SCENE_KEY)
            .and_then(|values| values.as_ref())
            .and_then(|values| values.get(stat))
            .map(|v| v.as_str())
    }

    /// Set the value of a scene-scope `stat`.
    pub fn set_scene_value(&mut self, stat: impl Into<String>, value: impl Into<String>) {
        self.scenes
            .entry(SCENE_KEY.to_string())
            .or_insert_with(|| Some(StatValues::new()))
            .get_or_insert_with(StatValues::new)
            .insert(stat.into(), value.into());
    }

    /// The computed record for one character, if any.
    pub fn character_values(&self, character: &str) -> Option<&StatValues> {
        self.characters
            .get(character)
            .and_then(|values| values.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.scenes.is_empty()
    }
}

/// One chat message with its swipe variants and per-swipe stat slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author name. Characters are keyed by this.
    pub name: String,

    /// System messages never carry stats.
    pub is_system: bool,

    /// Which swipe variant is currently shown.
    pub swipe_id: usize,

    /// Variant texts; index 0 is the original message.
    pub swipes: Vec<String>,

    /// One stat slot per swipe; grown lazily.
    #[serde(default)]
    pub stats: Vec<Option<MessageStats>>,
}

impl ChatMessage {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_system: false,
            swipe_id: 0,
            swipes: vec![text.into()],
            stats: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            is_system: true,
            swipe_id: 0,
            swipes: vec![text.into()],
            stats: Vec::new(),
        }
    }

    /// The currently shown variant's text.
    pub fn text(&self) -> &str {
        self.swipes
            .get(self.swipe_id)
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Add a variant and switch to it.
    pub fn add_swipe(&mut self, text: impl Into<String>) {
        self.swipes.push(text.into());
        self.swipe_id = self.swipes.len() - 1;
    }

    /// Switch to an existing variant. Out-of-range ids are ignored.
    pub fn set_swipe(&mut self, swipe_id: usize) {
        if swipe_id < self.swipes.len() {
            self.swipe_id = swipe_id;
        }
    }

    /// Whether this message can carry stats: not a system message, and
    /// not a message whose entire text is wrapped in square brackets.
    pub fn is_eligible(&self) -> bool {
        if self.is_system {
            return false;
        }
        let text = self.text().trim();
        !(text.starts_with('[') && text.ends_with(']') && text.len() >= 2)
    }

    /// The current swipe's stat record, if computed.
    pub fn current_stats(&self) -> Option<&MessageStats> {
        self.stats.get(self.swipe_id).and_then(|s| s.as_ref())
    }

    /// Replace the current swipe's stat record.
    pub fn set_current_stats(&mut self, stats: MessageStats) {
        if self.stats.len() <= self.swipe_id {
            self.stats.resize(self.swipe_id + 1, None);
        }
        self.stats[self.swipe_id] = Some(stats);
    }

    /// Delete the current swipe's stat record.
    pub fn clear_current_stats(&mut self) {
        if let Some(slot) = self.stats.get_mut(self.swipe_id) {
            *slot = None;
        }
    }
}

/// The message persistence collaborator.
///
/// Everything the orchestrator needs from the host's chat state. Reads
/// and writes go through these accessors only.
pub trait MessageStore {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn message(&self, index: usize) -> Option<&ChatMessage>;

    /// The stat record of the message's current swipe.
    fn stats(&self, index: usize) -> Option<&MessageStats>;

    /// Replace the stat record of the message's current swipe.
    /// Returns false when the index does not exist.
    fn set_stats(&mut self, index: usize, stats: MessageStats) -> bool;

    /// Request that the host persist the chat.
    fn save(&mut self);
}

/// In-memory chat log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,

    /// Set when a save was requested and not yet flushed by the host.
    #[serde(skip)]
    dirty: bool,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, returning its index.
    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_mut(&mut self, index: usize) -> Option<&mut ChatMessage> {
        self.messages.get_mut(index)
    }

    /// Distinct author names of non-system messages, in first-seen order.
    pub fn participants(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for message in &self.messages {
            if message.is_system {
                continue;
            }
            if !seen.contains(&message.name) {
                seen.push(message.name.clone());
            }
        }
        seen
    }

    /// Consume the dirty flag; the host calls this to decide on a flush.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

impl MessageStore for ChatLog {
    fn len(&self) -> usize {
        self.messages.len()
    }

    fn message(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    fn stats(&self, index: usize) -> Option<&MessageStats> {
        self.messages.get(index).and_then(|m| m.current_stats())
    }

    fn set_stats(&mut self, index: usize, stats: MessageStats) -> bool {
        match self.messages.get_mut(index) {
            Some(message) => {
                message.set_current_stats(stats);
                true
            }
            None => false,
        }
    }

    fn save(&mut self) {
        self.dirty = true;
    }
}
