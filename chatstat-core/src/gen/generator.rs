//! The generation orchestrator.
//!
//! One pass walks characters and stats strictly sequentially, one
//! in-flight completion at a time, so later stats see values generated
//! earlier in the same pass. Connection-class failures abort the rest
//! of the pass and arm a cooldown that suppresses automatic triggers.

use super::context::{self, MessageContext};
use super::prompt::{self, Subject};
use super::CompletionBackend;
use crate::chat::{MessageStats, MessageStore};
use crate::registry::{StatDefinition, StatRegistry, StatScope};
use crate::resolver::{resolve, ResolveError};
use crate::settings::GenerationSettings;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a generation pass before any stat is processed.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("dependency resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("no characters to generate stats for")]
    NoCharacters,
}

/// What to generate and how.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Message to process; defaults to the most recent eligible one.
    pub message_index: Option<usize>,

    /// Restrict the pass to one character.
    pub character: Option<String>,

    /// Generate one stat (and its dependencies) instead of all of them.
    pub stat: Option<String>,

    /// Deterministic sampling (temperature 0).
    pub greedy: bool,

    /// Copy values from the previous message instead of calling the
    /// endpoint.
    pub copy_from_previous: bool,

    /// Render-triggered rather than user-initiated. Automatic passes
    /// honor the auto-generate switch and the failure cooldown.
    pub automatic: bool,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            message_index: None,
            character: None,
            stat: None,
            greedy: true,
            copy_from_previous: false,
            automatic: false,
        }
    }
}

impl GenerateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// A render-triggered request for a specific message.
    pub fn automatic(index: usize) -> Self {
        Self {
            message_index: Some(index),
            automatic: true,
            ..Self::default()
        }
    }

    pub fn for_message(index: usize) -> Self {
        Self {
            message_index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_character(mut self, character: impl Into<String>) -> Self {
        self.character = Some(character.into());
        self
    }

    pub fn with_stat(mut self, stat: impl Into<String>) -> Self {
        self.stat = Some(stat.into());
        self
    }

    /// Sample with the configured temperature instead of greedily.
    pub fn exploratory(mut self) -> Self {
        self.greedy = false;
        self
    }

    pub fn copying_previous(mut self) -> Self {
        self.copy_from_previous = true;
        self
    }
}

/// Why a pass did nothing. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSuchMessage,
    EmptyMessage,
    AutoDisabled,
    Cooldown,
    Locked,
}

/// Result of one generation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped(SkipReason),
    Completed(PassSummary),
}

/// Counters for a completed pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub generated: usize,
    pub copied: usize,
    pub failed: usize,

    /// Whether anything changed and was written back to the store.
    pub wrote: bool,

    /// The pass was cut short by a connection-class failure.
    pub connection_failure: bool,
}

enum Step {
    Copied,
    Generated,
    Skipped,
    Failed,
    ConnectionFailure,
}

/// Drives stat generation for a chat session.
pub struct StatGenerator {
    backend: Arc<dyn CompletionBackend>,
    auto_generate: bool,
    cooldown: Duration,
    last_connection_failure: Option<Instant>,

    /// True while a pass is running; render triggers arriving then are
    /// deferred instead of starting a second chain.
    generating: bool,

    /// At most one deferred trigger is remembered; the latest wins.
    deferred: Option<usize>,

    /// Message indices with a pass in progress.
    locked: HashSet<usize>,
}

impl StatGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            auto_generate: true,
            cooldown: Duration::from_secs(10),
            last_connection_failure: None,
            generating: false,
            deferred: None,
            locked: HashSet::new(),
        }
    }

    pub fn with_settings(backend: Arc<dyn CompletionBackend>, settings: &GenerationSettings) -> Self {
        let mut generator = Self::new(backend);
        generator.auto_generate = settings.auto_generate;
        generator.cooldown = settings.cooldown();
        generator
    }

    /// Whether automatic generation is currently suppressed after a
    /// connection failure.
    pub fn in_cooldown(&self) -> bool {
        self.last_connection_failure
            .map(|at| at.elapsed() < self.cooldown)
            .unwrap_or(false)
    }

    /// Reset the failure cooldown, e.g. after the user fixed the
    /// endpoint configuration.
    pub fn clear_connection_failure(&mut self) {
        self.last_connection_failure = None;
    }

    /// Report that a message finished rendering.
    ///
    /// Returns the index to process now, or `None` when a pass is
    /// already running and the trigger was deferred. Intermediate
    /// deferred triggers are dropped; only the most recent survives.
    pub fn notify_rendered(&mut self, index: usize) -> Option<usize> {
        if self.generating {
            debug!(index, "generation in progress, deferring trigger");
            self.deferred = Some(index);
            None
        } else {
            Some(index)
        }
    }

    /// Take the deferred trigger, if one was remembered.
    pub fn take_deferred(&mut self) -> Option<usize> {
        self.deferred.take()
    }

    /// Process a render trigger, then drain any trigger deferred while
    /// the pass was running.
    pub async fn on_message_rendered(
        &mut self,
        store: &mut dyn MessageStore,
        registry: &StatRegistry,
        index: usize,
    ) -> Result<Vec<Outcome>, GenError> {
        let Some(index) = self.notify_rendered(index) else {
            return Ok(Vec::new());
        };

        let mut outcomes = vec![
            self.generate(store, registry, GenerateRequest::automatic(index))
                .await?,
        ];
        while let Some(deferred) = self.take_deferred() {
            outcomes.push(
                self.generate(store, registry, GenerateRequest::automatic(deferred))
                    .await?,
            );
        }
        Ok(outcomes)
    }

    /// Run one generation pass.
    ///
    /// Results are merged into the message's stat record and written
    /// back through the store only when something actually changed.
    pub async fn generate(
        &mut self,
        store: &mut dyn MessageStore,
        registry: &StatRegistry,
        request: GenerateRequest,
    ) -> Result<Outcome, GenError> {
        let index = match request.message_index {
            Some(index) if index < store.len() => index,
            Some(index) => {
                debug!(index, "no such message, skipping");
                return Ok(Outcome::Skipped(SkipReason::NoSuchMessage));
            }
            None => match context::last_eligible_index(store) {
                Some(index) => index,
                None => {
                    debug!("no eligible message, skipping");
                    return Ok(Outcome::Skipped(SkipReason::NoSuchMessage));
                }
            },
        };

        if request.automatic && !self.auto_generate {
            debug!(index, "auto-generation disabled, skipping");
            return Ok(Outcome::Skipped(SkipReason::AutoDisabled));
        }
        if self.in_cooldown() {
            if request.automatic {
                debug!(index, "in connection-failure cooldown, skipping");
                return Ok(Outcome::Skipped(SkipReason::Cooldown));
            }
        } else {
            // Window elapsed; stop carrying the stale flag.
            self.last_connection_failure = None;
        }

        let text_is_empty = store
            .message(index)
            .map(|m| m.text().trim().is_empty())
            .unwrap_or(true);
        if text_is_empty {
            debug!(index, "message text is empty, skipping");
            return Ok(Outcome::Skipped(SkipReason::EmptyMessage));
        }

        if !self.locked.insert(index) {
            debug!(index, "message already locked, skipping");
            return Ok(Outcome::Skipped(SkipReason::Locked));
        }
        self.generating = true;

        let result = self.run_pass(store, registry, &request, index).await;

        self.generating = false;
        self.locked.remove(&index);
        result
    }

    async fn run_pass(
        &mut self,
        store: &mut dyn MessageStore,
        registry: &StatRegistry,
        request: &GenerateRequest,
        index: usize,
    ) -> Result<Outcome, GenError> {
        let roster = match &request.character {
            Some(character) => vec![character.clone()],
            None => context::participants(store),
        };
        if roster.is_empty() {
            warn!("no characters to generate stats for");
            return Err(GenError::NoCharacters);
        }

        let ctx = match MessageContext::build(store, registry, index, &roster) {
            Some(ctx) => ctx,
            None => return Ok(Outcome::Skipped(SkipReason::NoSuchMessage)),
        };

        let (character_defs, mut scene_defs) = self.stat_sets(registry, request)?;
        if request.character.is_some() && request.stat.is_none() {
            // A character-filtered pass leaves scene stats alone.
            scene_defs.clear();
        }

        let original = store.stats(index).cloned();
        let mut record = original.clone().unwrap_or_default();
        context::fill_defaults(&mut record, registry, &roster);

        let mut summary = PassSummary::default();

        // Manual stats never reach the backend; copy-forward is the
        // only bulk way they move.
        if request.copy_from_previous {
            self.copy_manual_stats(registry, &ctx, &mut record, &roster, &mut summary);
        }

        let mut aborted = false;
        'characters: for character in &roster {
            for def in &character_defs {
                let step = self
                    .process_stat(
                        registry,
                        &ctx,
                        &mut record,
                        Subject::Character(character.as_str()),
                        def,
                        request,
                    )
                    .await;
                match step {
                    Step::Copied => summary.copied += 1,
                    Step::Generated => summary.generated += 1,
                    Step::Skipped => {}
                    Step::Failed => summary.failed += 1,
                    Step::ConnectionFailure => {
                        summary.failed += 1;
                        aborted = true;
                        break 'characters;
                    }
                }
            }
        }

        if !aborted {
            for def in &scene_defs {
                let step = self
                    .process_stat(registry, &ctx, &mut record, Subject::Scene, def, request)
                    .await;
                match step {
                    Step::Copied => summary.copied += 1,
                    Step::Generated => summary.generated += 1,
                    Step::Skipped => {}
                    Step::Failed => summary.failed += 1,
                    Step::ConnectionFailure => {
                        summary.failed += 1;
                        aborted = true;
                        break;
                    }
                }
            }
        }

        summary.connection_failure = aborted;
        summary.wrote = match &original {
            Some(original) => *original != record,
            None => !record.is_empty(),
        };
        if summary.wrote {
            store.set_stats(index, record);
            store.save();
        }

        info!(
            index,
            generated = summary.generated,
            copied = summary.copied,
            failed = summary.failed,
            wrote = summary.wrote,
            "stat generation pass finished"
        );
        Ok(Outcome::Completed(summary))
    }

    /// The non-manual stats to process, split by scope.
    fn stat_sets(
        &self,
        registry: &StatRegistry,
        request: &GenerateRequest,
    ) -> Result<(Vec<StatDefinition>, Vec<StatDefinition>), GenError> {
        let defs: Vec<StatDefinition> = match &request.stat {
            Some(target) => resolve(registry, target)?
                .iter()
                .filter_map(|name| registry.stat_entry(name))
                .filter(|def| !def.is_manual)
                .cloned()
                .collect(),
            None => registry
                .active_stats(None)
                .into_iter()
                .filter(|def| !def.is_manual)
                .cloned()
                .collect(),
        };

        let mut character_defs = Vec::new();
        let mut scene_defs = Vec::new();
        for def in defs {
            match def.scope {
                StatScope::Character => character_defs.push(def),
                StatScope::Scene => scene_defs.push(def),
            }
        }
        Ok((character_defs, scene_defs))
    }

    fn copy_manual_stats(
        &self,
        registry: &StatRegistry,
        ctx: &MessageContext,
        record: &mut MessageStats,
        roster: &[String],
        summary: &mut PassSummary,
    ) {
        for character in roster {
            for def in registry.active_stats(Some(StatScope::Character)) {
                if !def.is_manual {
                    continue;
                }
                if let Some(value) = ctx.previous_stats.character_value(character, &def.name) {
                    let value = value.to_string();
                    record.set_character_value(character.as_str(), def.name.as_str(), value);
                    summary.copied += 1;
                }
            }
        }
        for def in registry.active_stats(Some(StatScope::Scene)) {
            if !def.is_manual {
                continue;
            }
            if let Some(value) = ctx.previous_stats.scene_value(&def.name) {
                let value = value.to_string();
                record.set_scene_value(def.name.as_str(), value);
                summary.copied += 1;
            }
        }
    }

    async fn process_stat(
        &mut self,
        registry: &StatRegistry,
        ctx: &MessageContext,
        record: &mut MessageStats,
        subject: Subject<'_>,
        def: &StatDefinition,
        request: &GenerateRequest,
    ) -> Step {
        let current = match subject {
            Subject::Character(character) => record.character_value(character, &def.name),
            Subject::Scene => record.scene_value(&def.name),
        }
        .map(str::to_string);
        let previous = match subject {
            Subject::Character(character) => ctx.previous_stats.character_value(character, &def.name),
            Subject::Scene => ctx.previous_stats.scene_value(&def.name),
        }
        .map(str::to_string);

        if request.copy_from_previous {
            if let Some(value) = previous {
                set_value(record, subject, def, &value);
                debug!(stat = %def.name, "copied value from previous message");
                return Step::Copied;
            }
        }

        let explicitly_requested = request.stat.as_deref() == Some(def.name.as_str());
        let still_default = current.as_deref() == Some(def.default_value.as_str());
        if !still_default && !explicitly_requested {
            debug!(stat = %def.name, "value already set, skipping");
            return Step::Skipped;
        }

        let prompt = prompt::render(ctx, registry, subject, record, &def.name);
        let backend = self.backend.clone();
        let result = backend.infer(&prompt, request.greedy).await;

        match result {
            Ok(value) => {
                if value.trim().is_empty() {
                    warn!(stat = %def.name, "empty completion, keeping previous value");
                    return Step::Failed;
                }
                set_value(record, subject, def, value.trim());
                Step::Generated
            }
            Err(e) if e.is_connection_failure() => {
                self.last_connection_failure = Some(Instant::now());
                warn!(stat = %def.name, error = %e, "connection failure, aborting pass");
                Step::ConnectionFailure
            }
            Err(e) => {
                warn!(stat = %def.name, error = %e, "generation failed, keeping previous value");
                Step::Failed
            }
        }
    }
}

fn set_value(record: &mut MessageStats, subject: Subject<'_>, def: &StatDefinition, value: &str) {
    match subject {
        Subject::Character(character) => {
            record.set_character_value(character, def.name.as_str(), value)
        }
        Subject::Scene => record.set_scene_value(def.name.as_str(), value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompletions;

    fn generator() -> StatGenerator {
        StatGenerator::new(Arc::new(MockCompletions::new()))
    }

    #[test]
    fn test_deferred_trigger_coalesces_to_latest() {
        let mut generator = generator();

        assert_eq!(generator.notify_rendered(1), Some(1));

        generator.generating = true;
        assert!(generator.notify_rendered(3).is_none());
        assert!(generator.notify_rendered(4).is_none());
        assert!(generator.notify_rendered(5).is_none());
        generator.generating = false;

        assert_eq!(generator.take_deferred(), Some(5));
        assert_eq!(generator.take_deferred(), None);
    }

    #[test]
    fn test_cooldown_window() {
        let mut generator = generator();
        assert!(!generator.in_cooldown());

        generator.last_connection_failure = Some(Instant::now());
        assert!(generator.in_cooldown());

        generator.clear_connection_failure();
        assert!(!generator.in_cooldown());

        // An old failure outside the window no longer suppresses.
        generator.last_connection_failure =
            Instant::now().checked_sub(Duration::from_secs(11));
        assert!(!generator.in_cooldown());
    }

    #[test]
    fn test_settings_configure_guardrails() {
        let settings = GenerationSettings::default()
            .with_auto_generate(false)
            .with_cooldown_secs(30);
        let generator =
            StatGenerator::with_settings(Arc::new(MockCompletions::new()), &settings);
        assert!(!generator.auto_generate);
        assert_eq!(generator.cooldown, Duration::from_secs(30));
    }
}
