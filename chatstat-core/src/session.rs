//! StatSession - the primary public API for stat tracking.
//!
//! One session owns the registry, the chat log, the generator, and the
//! settings for the lifetime of a chat. Everything is explicit state
//! passed by handle; nothing lives in module-level globals.

use crate::chat::{ChatLog, ChatMessage};
use crate::gen::{
    CompletionBackend, GenError, GenerateRequest, Outcome, StatGenerator, TextGenBackend,
};
use crate::persist::{PersistError, SavedSession};
use crate::registry::StatRegistry;
use crate::settings::GenerationSettings;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("completion backend error: {0}")]
    Backend(#[from] textgen::Error),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("generation error: {0}")]
    Gen(#[from] GenError),
}

/// A stat tracking session for one chat.
pub struct StatSession {
    settings: GenerationSettings,
    registry: StatRegistry,
    chat: ChatLog,
    generator: StatGenerator,
}

impl StatSession {
    /// Create a new session with the builtin stat set.
    ///
    /// Fails when the settings do not describe a usable endpoint.
    pub fn new(settings: GenerationSettings) -> Result<Self, SessionError> {
        let backend = Arc::new(TextGenBackend::from_settings(&settings)?);
        Ok(Self::with_backend(settings, backend))
    }

    /// Create a session over an explicit backend (tests use a mock).
    pub fn with_backend(settings: GenerationSettings, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry: StatRegistry::with_builtin_defaults(),
            chat: ChatLog::new(),
            generator: StatGenerator::with_settings(backend, &settings),
            settings,
        }
    }

    /// Load a saved session from a file, migrating legacy formats.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let saved = SavedSession::load_json(path).await?;
        let backend = Arc::new(TextGenBackend::from_settings(&saved.settings)?);
        Ok(Self::from_saved(saved, backend))
    }

    /// Restore a session over an explicit backend.
    pub fn from_saved(saved: SavedSession, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry: saved.registry(),
            generator: StatGenerator::with_settings(backend, &saved.settings),
            chat: saved.chat,
            settings: saved.settings,
        }
    }

    /// Save the session to a file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        SavedSession::new(self.settings.clone(), &self.registry, self.chat.clone())
            .save_json(path)
            .await?;
        Ok(())
    }

    /// Append a message, returning its index.
    pub fn push_message(&mut self, message: ChatMessage) -> usize {
        self.chat.push(message)
    }

    /// Handle a message-render trigger: generate automatically, then
    /// drain any trigger deferred while the pass ran.
    pub async fn message_rendered(&mut self, index: usize) -> Result<Vec<Outcome>, SessionError> {
        Ok(self
            .generator
            .on_message_rendered(&mut self.chat, &self.registry, index)
            .await?)
    }

    /// Run an explicit generation pass.
    pub async fn generate(&mut self, request: GenerateRequest) -> Result<Outcome, SessionError> {
        Ok(self
            .generator
            .generate(&mut self.chat, &self.registry, request)
            .await?)
    }

    /// Export the stat history as diff-normalized JSON.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        crate::export::export_json(&self.chat)
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn registry(&self) -> &StatRegistry {
        &self.registry
    }

    /// Mutable registry access for add/remove/toggle operations.
    pub fn registry_mut(&mut self) -> &mut StatRegistry {
        &mut self.registry
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    /// Mutable chat access.
    ///
    /// Use with caution - direct stat edits bypass the generator.
    pub fn chat_mut(&mut self) -> &mut ChatLog {
        &mut self.chat
    }

    pub fn generator(&self) -> &StatGenerator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut StatGenerator {
        &mut self.generator
    }
}
