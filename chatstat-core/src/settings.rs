//! Generation settings.
//!
//! Serializable configuration for the completion endpoint and the
//! orchestrator's behavior. Stored alongside the stat definitions in
//! the session file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for stat generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Completion endpoint base URL, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,

    /// Model id to request. Empty means unconfigured.
    pub model: String,

    /// Sampling temperature for non-greedy generation.
    pub temperature: f32,

    /// Nucleus sampling for non-greedy generation.
    pub top_p: f32,

    /// Token cap per stat value.
    pub max_tokens: usize,

    /// Whether message renders trigger generation automatically.
    pub auto_generate: bool,

    /// How long automatic generation stays suppressed after a
    /// connection failure.
    pub cooldown_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 64,
            auto_generate: true,
            cooldown_secs: 10,
        }
    }
}

impl GenerationSettings {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_auto_generate(mut self, auto_generate: bool) -> Self {
        self.auto_generate = auto_generate;
        self
    }

    pub fn with_cooldown_secs(mut self, cooldown_secs: u64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Build a completion client from these settings.
    pub fn client(&self) -> Result<textgen::TextGen, textgen::Error> {
        if self.base_url.trim().is_empty() {
            return Err(textgen::Error::MissingBaseUrl);
        }
        if self.model.trim().is_empty() {
            return Err(textgen::Error::Config("no model configured".to_string()));
        }
        Ok(textgen::TextGen::new(self.base_url.clone()).with_model(self.model.clone()))
    }
}
