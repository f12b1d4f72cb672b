//! Session persistence.
//!
//! Saves settings, stat definitions, and the chat log as one JSON
//! document. Historical saves used a flat per-message stat map with no
//! character/scene split; those are migrated once at load instead of
//! being detected lazily on every access.

use crate::chat::{ChatLog, ChatMessage, MessageStats, MessageStore};
use crate::registry::{StatRegistry, StatScope};
use crate::settings::GenerationSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 2;

/// A saved session with all state needed to resume tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub settings: GenerationSettings,

    /// Stat definitions, in registry insertion order.
    pub definitions: Vec<crate::registry::StatDefinition>,

    pub chat: ChatLog,
}

impl SavedSession {
    /// Snapshot the current session state.
    pub fn new(settings: GenerationSettings, registry: &StatRegistry, chat: ChatLog) -> Self {
        Self {
            version: SAVE_VERSION,
            settings,
            definitions: registry.definitions().to_vec(),
            chat,
        }
    }

    /// Rebuild the registry from the saved definitions.
    pub fn registry(&self) -> StatRegistry {
        StatRegistry::from_definitions(self.definitions.clone())
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file, migrating legacy formats.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_content(&content)
    }

    /// Parse saved content, migrating legacy formats.
    pub fn from_content(content: &str) -> Result<Self, PersistError> {
        match peek_version(content)? {
            SAVE_VERSION => Ok(serde_json::from_str(content)?),
            1 => migrate_v1(content),
            found => Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found,
            }),
        }
    }
}

/// Read just the version field without parsing the full state.
fn peek_version(content: &str) -> Result<u32, PersistError> {
    #[derive(Deserialize)]
    struct Partial {
        version: u32,
    }

    let partial: Partial = serde_json::from_str(content)?;
    Ok(partial.version)
}

// ============================================================================
// Legacy format (version 1)
// ============================================================================

/// Version 1 stored one flat `stat -> value` map per message: no
/// character/scene split and no swipe dimension.
#[derive(Debug, Deserialize)]
struct LegacySession {
    #[serde(default)]
    settings: Option<GenerationSettings>,
    #[serde(default)]
    definitions: Vec<crate::registry::StatDefinition>,
    messages: Vec<LegacyMessage>,
}

#[derive(Debug, Deserialize)]
struct LegacyMessage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_system: bool,
    text: String,
    #[serde(default)]
    stats: Option<BTreeMap<String, String>>,
}

fn migrate_v1(content: &str) -> Result<SavedSession, PersistError> {
    let legacy: LegacySession = serde_json::from_str(content)?;

    // Scope lookup comes from the legacy file's own definitions.
    let registry = StatRegistry::from_definitions(legacy.definitions.clone());

    let mut chat = ChatLog::new();
    for message in legacy.messages {
        let index = if message.is_system {
            chat.push(ChatMessage::system(message.text))
        } else {
            chat.push(ChatMessage::new(message.name.clone(), message.text))
        };

        let Some(flat) = message.stats else {
            continue;
        };
        if message.is_system {
            continue;
        }

        let mut stats = MessageStats::new();
        for (stat, value) in flat {
            let scope = registry
                .stat_entry(&stat)
                .map(|d| d.scope)
                .unwrap_or(StatScope::Character);
            match scope {
                StatScope::Character => {
                    stats.set_character_value(message.name.as_str(), stat, value)
                }
                StatScope::Scene => stats.set_scene_value(stat, value),
            }
        }
        if let Some(slot) = chat.message_mut(index) {
            slot.set_current_stats(stats);
        }
    }

    tracing::info!(messages = chat.len(), "migrated version 1 session");
    Ok(SavedSession {
        version: SAVE_VERSION,
        settings: legacy.settings.unwrap_or_default(),
        definitions: legacy.definitions,
        chat,
    })
}
