//! Stat generation.
//!
//! The [`StatGenerator`] drives one sequential pass over a message:
//! build context, expand the requested stats, call the completion
//! backend once per stat, merge results back through the message store.

pub mod context;
pub mod generator;
pub mod prompt;

pub use context::MessageContext;
pub use generator::{GenError, GenerateRequest, Outcome, PassSummary, SkipReason, StatGenerator};

use crate::settings::GenerationSettings;
use async_trait::async_trait;
use textgen::{CompletionRequest, TextGen};

/// Seam over the completion endpoint.
///
/// One call produces one stat value. Implemented for the real client
/// below and by `MockCompletions` in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Infer a single stat value from the prompt.
    ///
    /// `greedy` requests deterministic sampling (temperature 0).
    async fn infer(&self, prompt: &str, greedy: bool) -> Result<String, textgen::Error>;
}

/// [`CompletionBackend`] over a [`textgen::TextGen`] client.
pub struct TextGenBackend {
    client: TextGen,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
}

impl TextGenBackend {
    pub fn new(client: TextGen) -> Self {
        Self {
            client,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 64,
        }
    }

    /// Build the backend from session settings.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self, textgen::Error> {
        Ok(Self {
            client: settings.client()?,
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for TextGenBackend {
    async fn infer(&self, prompt: &str, greedy: bool) -> Result<String, textgen::Error> {
        let request = if greedy {
            CompletionRequest::greedy(prompt)
        } else {
            CompletionRequest::new(prompt)
                .with_temperature(self.temperature)
                .with_top_p(self.top_p)
        }
        .with_max_tokens(self.max_tokens);

        let completion = self.client.complete(request).await?;
        Ok(completion.value())
    }
}
