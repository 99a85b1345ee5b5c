//! Translation services and the phase orchestrator for BookLingua
//!
//! This crate connects the core pipeline model from `booklingua` to an
//! external language-generation service and drives the phases over a
//! document.
//!
//! # Workflow Example
//!
//! ```ignore
//! use booklingua::{CacheStore, MarkdownDocument, Phase};
//! use booklingua_mt::{
//!     ChatCompletionsProvider, Orchestrator, PipelineSettings, Preset, ProviderConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Resolve the provider before anything runs
//!     let config = ProviderConfig::resolve(Preset::Ollama, Default::default())?;
//!     let provider = ChatCompletionsProvider::new(config)?;
//!
//!     // 2. Open the per-document cache
//!     let settings = PipelineSettings::new("english", "romanian");
//!     let store = CacheStore::open("book.lingua", settings.lock_timeout)?;
//!
//!     // 3. Run the phases; an interrupted run resumes from the cache
//!     let mut orchestrator =
//!         Orchestrator::new(store, Arc::new(provider), Arc::new(MarkdownDocument), settings)?;
//!     let summary = orchestrator
//!         .run(
//!             &[Phase::Extract, Phase::Translate, Phase::Build],
//!             "book.md".as_ref(),
//!             "book_romanian.md".as_ref(),
//!         )
//!         .await?;
//!
//!     println!("Failed units: {:?}", summary.failed_units());
//!     Ok(())
//! }
//! ```

pub mod chat_completions;
pub mod config;
pub mod context;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod quality;
pub mod throttle;
pub mod translator;


// Re-export main types for convenient access
pub use chat_completions::ChatCompletionsProvider;
pub use config::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_CHUNK_CHARS, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT, PipelineSettings, Preset, ProviderConfig, ProviderOverrides,
};
pub use context::{
    ContextManager, ContextWindow, DEFAULT_CONTEXT_SIZE, DEFAULT_PREFILL_SIZE, Exchange,
    is_useful_exchange, sample_paragraphs,
};
pub use error::{MtError, MtResult, PipelineError, PipelineResult};
pub use mock::{MockMode, MockTranslator};
pub use orchestrator::{Orchestrator, PhaseReport, RunSummary};
pub use quality::{
    ErrorCounts, QualityReport, adequacy, consistency, detect_context_bleeding, detect_errors,
    fluency, text_similarity,
};
pub use throttle::{RetryPolicy, Throttle};
pub use translator::{MachineTranslator, clean_reply, language_tag, wrap_tagged};
