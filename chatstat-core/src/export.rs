//! Stat history export.
//!
//! Exports the chat's stat history in a diff-friendly shape: any
//! character or scene key appearing in a message's entry also appears
//! (possibly as null) in the immediately preceding entry, so a diff
//! between neighbors never sees a key materialize from nowhere.

use crate::chat::{ChatLog, MessageStats, MessageStore};
use serde::{Deserialize, Serialize};

/// The exported stat history of one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatExport {
    pub entries: Vec<ExportEntry>,
}

/// One eligible message's stat snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Message index in the chat log.
    pub index: usize,
    pub stats: MessageStats,
}

/// Export the stat history of all eligible messages, normalized.
pub fn export_stats(log: &ChatLog) -> StatExport {
    let mut entries: Vec<ExportEntry> = log
        .messages()
        .iter()
        .enumerate()
        .filter(|(_, message)| message.is_eligible())
        .map(|(index, message)| ExportEntry {
            index,
            stats: message.current_stats().cloned().unwrap_or_default(),
        })
        .collect();
    normalize_entries(&mut entries);
    StatExport { entries }
}

/// Backfill later-introduced keys into each preceding entry as null.
///
/// Runs back to front, so a key introduced at entry N propagates all
/// the way down to entry 0.
pub fn normalize_entries(entries: &mut [ExportEntry]) {
    for i in (1..entries.len()).rev() {
        let character_keys: Vec<String> = entries[i].stats.characters.keys().cloned().collect();
        let scene_keys: Vec<String> = entries[i].stats.scenes.keys().cloned().collect();

        let previous = &mut entries[i - 1].stats;
        for key in character_keys {
            previous.characters.entry(key).or_insert(None);
        }
        for key in scene_keys {
            previous.scenes.entry(key).or_insert(None);
        }
    }
}

/// Export as pretty-printed JSON.
pub fn export_json(log: &ChatLog) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&export_stats(log))
}

/// Parse a previously exported history.
pub fn parse_export(json: &str) -> Result<StatExport, serde_json::Error> {
    serde_json::from_str(json)
}

/// Apply a pasted snapshot to a message slot and request a save.
///
/// Returns false (no save) when the index does not exist.
pub fn paste_stats(store: &mut dyn MessageStore, index: usize, stats: MessageStats) -> bool {
    if store.set_stats(index, stats) {
        store.save();
        true
    } else {
        false
    }
}
