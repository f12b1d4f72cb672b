//! Testing utilities.
//!
//! - `MockCompletions` for deterministic generation without a server
//! - `RecordingStore` for asserting on persistence traffic
//! - `TestHarness` for wiring a registry, chat, and generator together

use crate::chat::{ChatLog, ChatMessage, MessageStats, MessageStore};
use crate::gen::{CompletionBackend, GenError, GenerateRequest, Outcome, StatGenerator};
use crate::registry::{StatDefinition, StatRegistry, StatScope};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A completion backend that returns scripted results.
///
/// Responses are consumed in order; every prompt the generator sends is
/// recorded, so tests can assert which stats reached the endpoint.
pub struct MockCompletions {
    inner: Mutex<Inner>,
}

struct Inner {
    responses: VecDeque<Result<String, textgen::Error>>,
    prompts: Vec<String>,
}

impl MockCompletions {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                responses: VecDeque::new(),
                prompts: Vec::new(),
            }),
        }
    }

    /// Queue a successful completion value.
    pub fn value(self, value: impl Into<String>) -> Self {
        self.queue_value(value);
        self
    }

    /// Queue an error result.
    pub fn error(self, error: textgen::Error) -> Self {
        self.queue_error(error);
        self
    }

    pub fn queue_value(&self, value: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(Ok(value.into()));
    }

    pub fn queue_error(&self, error: textgen::Error) {
        self.inner.lock().unwrap().responses.push_back(Err(error));
    }

    /// Every prompt sent so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().prompts.len()
    }
}

impl Default for MockCompletions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for MockCompletions {
    async fn infer(&self, prompt: &str, _greedy: bool) -> Result<String, textgen::Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.prompts.push(prompt.to_string());
        inner.responses.pop_front().unwrap_or_else(|| {
            Err(textgen::Error::InvalidResponse(
                "no scripted completions left".to_string(),
            ))
        })
    }
}

/// A [`MessageStore`] that counts writes and save requests.
pub struct RecordingStore {
    pub log: ChatLog,
    pub set_calls: usize,
    pub save_calls: usize,
}

impl RecordingStore {
    pub fn new(log: ChatLog) -> Self {
        Self {
            log,
            set_calls: 0,
            save_calls: 0,
        }
    }
}

impl MessageStore for RecordingStore {
    fn len(&self) -> usize {
        self.log.len()
    }

    fn message(&self, index: usize) -> Option<&ChatMessage> {
        self.log.message(index)
    }

    fn stats(&self, index: usize) -> Option<&MessageStats> {
        self.log.stats(index)
    }

    fn set_stats(&mut self, index: usize, stats: MessageStats) -> bool {
        self.set_calls += 1;
        self.log.set_stats(index, stats)
    }

    fn save(&mut self) {
        self.save_calls += 1;
        self.log.save();
    }
}

/// Wires a registry, a recording store, and a mock-backed generator.
pub struct TestHarness {
    pub registry: StatRegistry,
    pub store: RecordingStore,
    pub mock: Arc<MockCompletions>,
    pub generator: StatGenerator,
}

impl TestHarness {
    /// A harness with the two-stat registry used across the tests:
    /// `pose` (order 0) and `location` (order 1, depends on pose).
    pub fn new() -> Self {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("pose", StatScope::Character).with_order(0));
        registry.add_stat(
            StatDefinition::new("location", StatScope::Character)
                .with_order(1)
                .with_dependencies(vec!["pose".to_string()]),
        );
        Self::with_registry(registry)
    }

    pub fn with_registry(registry: StatRegistry) -> Self {
        let mock = Arc::new(MockCompletions::new());
        let generator = StatGenerator::new(mock.clone());
        Self {
            registry,
            store: RecordingStore::new(ChatLog::new()),
            mock,
            generator,
        }
    }

    /// Append a message, returning its index.
    pub fn say(&mut self, name: &str, text: &str) -> usize {
        self.store.log.push(ChatMessage::new(name, text))
    }

    /// Run a pass with the given request.
    pub async fn generate(&mut self, request: GenerateRequest) -> Result<Outcome, GenError> {
        self.generator
            .generate(&mut self.store, &self.registry, request)
            .await
    }

    /// The stat value stored for (character, stat) at `index`.
    pub fn value(&self, index: usize, character: &str, stat: &str) -> Option<String> {
        self.store
            .stats(index)
            .and_then(|s| s.character_value(character, stat))
            .map(|v| v.to_string())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a pass completed and hand back its summary.
#[track_caller]
pub fn assert_completed(outcome: Outcome) -> crate::gen::PassSummary {
    match outcome {
        Outcome::Completed(summary) => summary,
        Outcome::Skipped(reason) => panic!("expected a completed pass, got skip: {reason:?}"),
    }
}
