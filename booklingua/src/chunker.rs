//! Chunking and reconstruction of unit text
//!
//! Long unit text is split into bounded chunks at safe boundaries so each
//! piece fits a single service call. Chunks are verbatim slices: every chunk
//! keeps its trailing paragraph separator, so concatenating the chunks in
//! ordinal order reproduces the original text exactly.
//!
//! Splitting prefers, in order:
//! 1. Paragraph boundaries (blank lines)
//! 2. Sentence boundaries inside an oversized paragraph
//! 3. Whitespace
//! 4. A plain character boundary

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A blank-line paragraph separator, including any extra blank lines
static PARAGRAPH_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph separator regex"));

/// Sentence end: terminal punctuation, optional closing quotes, whitespace
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?…]["'”’»)\]]*\s+"#).expect("sentence end regex")
});

/// Leading formatting markers: optional list number, then non-letter run
static MARKER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:[^\p{L}\p{N}"'“‘«(\[]*\d+[.)][ \t]+)?[^\p{L}\p{N}"'“‘«(\[]*"#)
        .expect("marker prefix regex")
});

/// Trailing emphasis markers and whitespace
static MARKER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s*_~`]+$").expect("marker suffix regex"));

/// Errors raised when merging translated chunks back into unit text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("unit {unit}: no chunks to reconstruct")]
    Empty { unit: usize },
    #[error("unit {unit}: incomplete, missing chunk ordinals {missing:?}")]
    IncompleteUnit { unit: usize, missing: Vec<usize> },
    #[error("unit {unit}: received a chunk of unit {found}")]
    ForeignChunk { unit: usize, found: usize },
    #[error("unit {unit}: chunk declares {found} total chunks, expected {expected}")]
    TotalMismatch {
        unit: usize,
        expected: usize,
        found: usize,
    },
    #[error("unit {unit}: chunk ordinal {ordinal} is out of range for {total} chunks")]
    OrdinalOutOfRange {
        unit: usize,
        ordinal: usize,
        total: usize,
    },
    #[error("unit {unit}: conflicting texts for chunk ordinal {ordinal}")]
    ConflictingDuplicate { unit: usize, ordinal: usize },
}

/// A contiguous slice of a unit's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Index of the parent unit
    pub unit: usize,
    /// Position of this chunk within the unit, starting at 0
    pub ordinal: usize,
    /// Number of chunks the unit was split into
    pub total: usize,
    /// Verbatim text, including trailing separator whitespace
    pub text: String,
}

impl TextChunk {
    /// The text without its surrounding whitespace
    pub fn body(&self) -> &str {
        self.text.trim()
    }

    /// Build the translated counterpart of this chunk
    ///
    /// The surrounding whitespace of the source slice is restored around the
    /// translated body, so paragraph separators survive whatever whitespace
    /// the service returns.
    pub fn rewrap(&self, translated: &str) -> TextChunk {
        let (lead, _, trail) = split_edges(&self.text);
        TextChunk {
            unit: self.unit,
            ordinal: self.ordinal,
            total: self.total,
            text: format!("{}{}{}", lead, translated.trim(), trail),
        }
    }
}

/// Split `text` into leading whitespace, body and trailing whitespace
fn split_edges(text: &str) -> (&str, &str, &str) {
    let body_start = text.len() - text.trim_start().len();
    let body_end = text.trim_end().len().max(body_start);
    (
        &text[..body_start],
        &text[body_start..body_end],
        &text[body_end..],
    )
}

/// Split unit text into chunks of at most `max_chars` characters
///
/// Whole paragraphs are packed greedily. A paragraph longer than
/// `max_chars` is cut on its own at the best boundary available. Empty text
/// still yields a single empty chunk so every unit has at least one ordinal.
///
/// # Arguments
/// * `unit` - Index of the parent unit
/// * `text` - The unit text
/// * `max_chars` - Upper bound on chunk size, in characters (at least 1)
///
/// # Returns
/// Chunks in ordinal order, each carrying the final `total`
///
/// # Example
/// ```ignore
/// let chunks = chunk(0, "One.\n\nTwo.\n\nThree.", 12);
/// assert_eq!(chunks.len(), 2);
/// ```
pub fn chunk(unit: usize, text: &str, max_chars: usize) -> Vec<TextChunk> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for segment in paragraph_segments(text) {
        let len = segment.chars().count();

        if len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pieces.extend(split_oversized(segment, max_chars).into_iter().map(String::from));
            continue;
        }

        if current_len + len > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(segment);
        current_len += len;
    }

    if !current.is_empty() || pieces.is_empty() {
        pieces.push(current);
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| TextChunk {
            unit,
            ordinal,
            total,
            text,
        })
        .collect()
}

/// Paragraphs, each followed by the separator that ends it
fn paragraph_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for sep in PARAGRAPH_SEPARATOR.find_iter(text) {
        segments.push(&text[start..sep.end()]);
        start = sep.end();
    }
    if start < text.len() {
        segments.push(&text[start..]);
    }
    segments
}

/// Cut one oversized paragraph into pieces of at most `max_chars`
fn split_oversized(mut rest: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();

    while rest.chars().count() > max_chars {
        // Byte offset just past the max_chars-th character
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..limit];

        let cut = SENTENCE_END
            .find_iter(window)
            .last()
            .map(|m| m.end())
            .or_else(|| {
                window
                    .char_indices()
                    .filter(|(i, c)| *i > 0 && c.is_whitespace())
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
            })
            .unwrap_or(limit);

        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Merge translated chunks back into unit text
///
/// Chunks may arrive in any order; they are assembled strictly by ordinal.
/// An exact duplicate of a chunk is tolerated, a differing one is not.
///
/// # Arguments
/// * `unit` - Index of the unit being rebuilt
/// * `chunks` - Translated chunks, all belonging to `unit`
///
/// # Returns
/// * `Ok(String)` - The concatenated text
/// * `Err(ChunkError)` - If any ordinal in `0..total` is missing, or the
///   chunks are inconsistent
pub fn reconstruct(unit: usize, chunks: &[TextChunk]) -> Result<String, ChunkError> {
    let Some(first) = chunks.first() else {
        return Err(ChunkError::Empty { unit });
    };
    let total = first.total;

    let mut by_ordinal: BTreeMap<usize, &str> = BTreeMap::new();
    for chunk in chunks {
        if chunk.unit != unit {
            return Err(ChunkError::ForeignChunk {
                unit,
                found: chunk.unit,
            });
        }
        if chunk.total != total {
            return Err(ChunkError::TotalMismatch {
                unit,
                expected: total,
                found: chunk.total,
            });
        }
        if chunk.ordinal >= total {
            return Err(ChunkError::OrdinalOutOfRange {
                unit,
                ordinal: chunk.ordinal,
                total,
            });
        }
        if let Some(existing) = by_ordinal.insert(chunk.ordinal, &chunk.text) {
            if existing != chunk.text {
                return Err(ChunkError::ConflictingDuplicate {
                    unit,
                    ordinal: chunk.ordinal,
                });
            }
        }
    }

    let missing: Vec<usize> = (0..total).filter(|o| !by_ordinal.contains_key(o)).collect();
    if !missing.is_empty() {
        return Err(ChunkError::IncompleteUnit { unit, missing });
    }

    Ok(by_ordinal.into_values().collect())
}

/// Separate formatting markers from the translatable core of a paragraph
///
/// The prefix is the leading run of non-letter markers (`## `, `> `, `* `,
/// `1. `). The suffix is a trailing run of emphasis markers and is only
/// split off when a prefix exists, so `**bold**` becomes `("**", "bold",
/// "**")` while `Plain text.` is left whole.
///
/// Text spanning several paragraphs is left whole: the first paragraph's
/// prefix says nothing about the last one's trailing markers.
///
/// # Returns
/// `(prefix, core, suffix)` where `prefix + core + suffix == text`
pub fn split_markers(text: &str) -> (&str, &str, &str) {
    if PARAGRAPH_SEPARATOR.is_match(text) {
        return ("", text, "");
    }
    let prefix_end = MARKER_PREFIX.find(text).map(|m| m.end()).unwrap_or(0);
    if prefix_end == 0 {
        return ("", text, "");
    }

    let rest = &text[prefix_end..];
    let suffix_start = MARKER_SUFFIX
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());

    (&text[..prefix_end], &rest[..suffix_start], &rest[suffix_start..])
}

/// Whether the text has anything to translate
///
/// Numbers, rules and symbols are copied verbatim.
pub fn needs_translation(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}
