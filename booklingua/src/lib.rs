//! Core of the BookLingua translation pipeline
//!
//! This crate holds everything the pipeline needs that does not talk to a
//! translation service: the unit model and its phase state machine, chapter
//! selection, chunking and reconstruction, document adapters, and the
//! persistent cache store.
//!
//! ```ignore
//! use booklingua::{CacheStore, DocumentAdapter, MarkdownDocument, chunk, reconstruct};
//!
//! // 1. Split a document into units
//! let units = MarkdownDocument.extract_units(Path::new("book.md"))?;
//!
//! // 2. Chunk a unit for translation
//! let chunks = chunk(units[1].index, &units[1].text, 2000);
//!
//! // 3. Put the (translated) chunks back together
//! let text = reconstruct(units[1].index, &chunks)?;
//! assert_eq!(text, units[1].text);
//! ```

pub mod chunker;
pub mod document;
pub mod selection;
pub mod store;
pub mod unit;

// Re-export main types for convenient access
pub use chunker::{ChunkError, TextChunk, chunk, needs_translation, reconstruct, split_markers};
pub use document::{DocumentAdapter, DocumentError, FinalText, MarkdownDocument, SourceUnit};
pub use selection::{ChapterSelection, SelectionError};
pub use store::{CacheEntry, CacheStore, StoreError, StoreResult, normalize_source};
pub use unit::{Phase, QualityScores, TransitionError, UnitRecord, UnitStatus};
