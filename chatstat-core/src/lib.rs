//! Per-message character and scene stat tracking for roleplay chats.
//!
//! This crate provides:
//! - A registry of stat definitions (scope, defaults, dependencies, order)
//! - Dependency resolution with cycle detection
//! - A generation orchestrator that infers stat values from message
//!   content through a text completion endpoint
//! - Session persistence with versioned schema migration
//! - Diff-normalized export of stat history
//!
//! # Quick Start
//!
//! ```ignore
//! use chatstat_core::{
//!     ChatLog, ChatMessage, GenerateRequest, GenerationSettings, StatGenerator, StatRegistry,
//! };
//! use chatstat_core::gen::TextGenBackend;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = GenerationSettings::new("http://127.0.0.1:5000", "mistral-7b");
//!     let backend = Arc::new(TextGenBackend::from_settings(&settings)?);
//!
//!     let registry = StatRegistry::with_builtin_defaults();
//!     let mut generator = StatGenerator::with_settings(backend, &settings);
//!
//!     let mut chat = ChatLog::new();
//!     chat.push(ChatMessage::new("Alice", "She sits down by the fire."));
//!
//!     let outcome = generator
//!         .generate(&mut chat, &registry, GenerateRequest::new())
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod export;
pub mod gen;
pub mod persist;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod testing;

// Primary public API
pub use chat::{ChatLog, ChatMessage, MessageStats, MessageStore, StatValues};
pub use gen::{GenError, GenerateRequest, Outcome, PassSummary, SkipReason, StatGenerator};
pub use persist::{PersistError, SavedSession};
pub use registry::{RegistryEvent, StatDefinition, StatRegistry, StatScope};
pub use resolver::{resolve, ResolveError};
pub use session::{SessionError, StatSession};
pub use settings::GenerationSettings;
