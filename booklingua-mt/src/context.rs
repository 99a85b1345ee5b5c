//! Rolling translation context per chapter
//!
//! Each translation request carries a few recent (source, translation)
//! exchanges from the same chapter so the model keeps names and terms
//! consistent. The window is bounded and is scoped to one chapter: starting
//! a new chapter discards the previous one, unless the new chapter is small
//! and the previous window holds substantial examples.

use crate::quality::text_similarity;
use booklingua::CacheEntry;
use std::collections::{HashMap, VecDeque};

/// Default number of exchanges kept per chapter
pub const DEFAULT_CONTEXT_SIZE: usize = 5;
/// Default number of exchanges used to seed a resumed chapter
pub const DEFAULT_PREFILL_SIZE: usize = 3;

/// Source length range (in characters) preferred for prefill examples
const PREFILL_MIN_CHARS: usize = 50;
const PREFILL_MAX_CHARS: usize = 200;

/// One prior (source, translation) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub source: String,
    pub translation: String,
}

impl Exchange {
    pub fn new(source: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            translation: translation.into(),
        }
    }

    fn word_count(&self) -> usize {
        self.source.split_whitespace().count() + self.translation.split_whitespace().count()
    }
}

/// Whether a pair is worth keeping as context
///
/// Rejects empty pairs and near-identical pairs of more than a few words,
/// which are usually untranslated text or meta replies.
pub fn is_useful_exchange(source: &str, translation: &str) -> bool {
    let source = source.trim();
    let translation = translation.trim();
    if source.is_empty() || translation.is_empty() {
        return false;
    }
    !(source.split_whitespace().count() > 5 && text_similarity(source, translation) > 0.95)
}

/// Bounded FIFO of exchanges for one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an exchange, evicting the oldest when full
    ///
    /// An exchange with the same source as one already held replaces it and
    /// becomes the newest, so replaying cached work never duplicates context.
    pub fn push(&mut self, exchange: Exchange) {
        if self.capacity == 0 {
            return;
        }
        self.exchanges.retain(|e| e.source != exchange.source);
        while self.exchanges.len() >= self.capacity {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(exchange);
    }

    /// Exchanges in insertion order
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }

    /// The newest `count` exchanges, in insertion order
    pub fn recent(&self, count: usize) -> Vec<Exchange> {
        let skip = self.exchanges.len().saturating_sub(count);
        self.exchanges.iter().skip(skip).cloned().collect()
    }

    /// The newest exchanges that fit in `word_budget` words, in insertion order
    ///
    /// Stops at the first exchange that would overflow the budget, so the
    /// result is always a contiguous recent suffix of the window.
    pub fn limited(&self, word_budget: usize) -> Vec<Exchange> {
        let mut used = 0;
        let mut kept = Vec::new();
        for exchange in self.exchanges.iter().rev() {
            let words = exchange.word_count();
            if used + words > word_budget {
                break;
            }
            used += words;
            kept.push(exchange.clone());
        }
        kept.reverse();
        kept
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.exchanges.iter().any(|e| e.source == source.trim())
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owner of the per-chapter windows during a phase run
#[derive(Debug, Clone)]
pub struct ContextManager {
    capacity: usize,
    windows: HashMap<usize, ContextWindow>,
    current: Option<usize>,
}

impl ContextManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
            current: None,
        }
    }

    /// The window of a chapter, created empty on first access
    pub fn window(&mut self, chapter: usize) -> &ContextWindow {
        let capacity = self.capacity;
        self.windows
            .entry(chapter)
            .or_insert_with(|| ContextWindow::new(capacity))
    }

    /// Start a chapter, dropping every other chapter's window
    ///
    /// A chapter of fewer than twice the capacity in paragraphs inherits the
    /// previous chapter's window when every source in it is longer than 50
    /// characters. Otherwise it starts empty.
    ///
    /// # Arguments
    /// * `chapter` - Index of the chapter about to be translated
    /// * `paragraphs` - Number of paragraphs in it
    ///
    /// # Returns
    /// `true` when the previous window was carried over
    pub fn begin_chapter(&mut self, chapter: usize, paragraphs: usize) -> bool {
        let previous = self.current.and_then(|c| self.windows.remove(&c));
        self.windows.clear();
        self.current = Some(chapter);

        let small = paragraphs < 2 * self.capacity;
        let carried = previous.filter(|window| {
            small
                && !window.is_empty()
                && window
                    .exchanges
                    .iter()
                    .all(|e| e.source.chars().count() > PREFILL_MIN_CHARS)
        });
        let kept = carried.is_some();
        let window = carried.unwrap_or_else(|| ContextWindow::new(self.capacity));
        self.windows.insert(chapter, window);
        kept
    }

    /// Record an exchange if it is useful
    ///
    /// # Returns
    /// `true` when the exchange was added
    pub fn record(&mut self, chapter: usize, source: &str, translation: &str) -> bool {
        if !is_useful_exchange(source, translation) {
            return false;
        }
        let capacity = self.capacity;
        self.windows
            .entry(chapter)
            .or_insert_with(|| ContextWindow::new(capacity))
            .push(Exchange::new(source.trim(), translation.trim()));
        true
    }

    /// Top up a chapter window from existing cache entries
    ///
    /// `entries` must be ordered most recent first. The window is filled up
    /// to `limit` exchanges with single-paragraph entries of mid-length
    /// source (50-200 characters) whose translation differs from it, skipping
    /// sources the window already holds. Picked entries go in oldest first.
    /// Call it once per source tier, the closest tier first.
    ///
    /// # Returns
    /// How many exchanges were added
    pub fn prefill(&mut self, chapter: usize, entries: &[CacheEntry], limit: usize) -> usize {
        let window = self.window(chapter);
        let wanted = limit.min(window.capacity()).saturating_sub(window.len());
        let mut picked: Vec<&CacheEntry> = entries
            .iter()
            .filter(|e| {
                let source = e.source.trim();
                let len = source.chars().count();
                (PREFILL_MIN_CHARS..=PREFILL_MAX_CHARS).contains(&len)
                    && !source.contains("\n\n")
                    && source != e.translation.trim()
                    && is_useful_exchange(source, &e.translation)
                    && !window.contains_source(source)
            })
            .take(wanted)
            .collect();
        picked.reverse();

        picked
            .into_iter()
            .filter(|e| self.record(chapter, &e.source, &e.translation))
            .count()
    }
}

/// Pick up to `count` paragraphs of a text, evenly spaced
///
/// Used to prime the context of a resumed chapter when no usable cache
/// entries exist. Only paragraphs with something to translate count, and
/// mid-length ones are preferred when there are enough of them.
pub fn sample_paragraphs(text: &str, count: usize) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| booklingua::needs_translation(p))
        .collect();

    let mid_length: Vec<&str> = paragraphs
        .iter()
        .copied()
        .filter(|p| (PREFILL_MIN_CHARS..=PREFILL_MAX_CHARS).contains(&p.chars().count()))
        .collect();
    let pool = if mid_length.len() >= count {
        mid_length
    } else {
        paragraphs
    };

    if pool.len() <= count {
        return pool.into_iter().map(String::from).collect();
    }
    (0..count)
        .map(|i| pool[i * pool.len() / count].to_string())
        .collect()
}
