//! Heuristic quality assessment
//!
//! None of these scores look at meaning. They are cheap signals that flag
//! translations worth a human look: erratic sentence structure, suspicious
//! length changes, terms handled differently across chapters, copied source
//! text and output that echoes the context instead of the input.

use crate::context::Exchange;
use booklingua::{QualityScores, split_markers};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?…]+\s*").expect("sentence split regex"));

static CAPITALISED_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}\p{Ll}{2,}\b").expect("capitalised term regex"));

static HTML_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)[^>/]*>").expect("open tag regex"));

static HTML_CLOSE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</([a-zA-Z][a-zA-Z0-9]*)\s*>").expect("close tag regex"));

/// Counts of suspected problems in a translation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    /// Sentences copied verbatim from the source
    pub untranslated: usize,
    /// Three-word phrases repeated far more than in the source
    pub repeated_phrases: usize,
    /// Unbalanced emphasis markers, code spans or tags, and lost prefixes
    pub formatting: usize,
    /// Length anomalies that suggest dropped or invented content
    pub mistranslations: usize,
}

impl ErrorCounts {
    pub fn total(&self) -> usize {
        self.untranslated + self.repeated_phrases + self.formatting + self.mistranslations
    }
}

/// Scores and suspected errors for one translated unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityReport {
    pub scores: QualityScores,
    pub errors: ErrorCounts,
}

impl QualityReport {
    /// Assess a translated unit
    ///
    /// # Arguments
    /// * `source` - Unit source text
    /// * `translation` - Unit translation
    /// * `others` - (source, translation) pairs of other units in the same
    ///   language pair, used for the consistency score
    pub fn assess(source: &str, translation: &str, others: &[(String, String)]) -> Self {
        Self {
            scores: QualityScores {
                fluency: fluency(translation),
                adequacy: adequacy(source, translation),
                consistency: consistency(source, translation, others),
            },
            errors: detect_errors(source, translation),
        }
    }

    pub fn overall(&self) -> u8 {
        self.scores.overall()
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn to_score(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn ratio(a: usize, b: usize) -> f64 {
    match (a, b) {
        (0, 0) => 1.0,
        _ => a.min(b) as f64 / a.max(b) as f64,
    }
}

/// Word-set Jaccard similarity, 1.0 for two empty texts
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = words(a).into_iter().collect();
    let b: HashSet<String> = words(b).into_iter().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f64 / union as f64
}

/// Fluency of a text on its own, 0-100
///
/// Penalises variance of sentence lengths (in words) and the share of the
/// single most repeated word.
pub fn fluency(text: &str) -> u8 {
    let all_words = words(text);
    if all_words.is_empty() {
        return 0;
    }

    let lengths: Vec<f64> = sentences(text)
        .iter()
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    let variance = if lengths.len() > 1 {
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64
    } else {
        0.0
    };

    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for word in &all_words {
        *frequency.entry(word.as_str()).or_default() += 1;
    }
    let max_frequency = frequency.values().copied().max().unwrap_or(0);

    to_score(1.0 - variance / 1000.0 - max_frequency as f64 / all_words.len() as f64)
}

/// Adequacy of a translation against its source, 0-100
///
/// Weighted: 30% word count ratio, 50% lexical overlap, 20% character
/// length ratio.
pub fn adequacy(source: &str, translation: &str) -> u8 {
    let word_ratio = ratio(
        source.split_whitespace().count(),
        translation.split_whitespace().count(),
    );
    let char_ratio = ratio(source.chars().count(), translation.chars().count());
    let overlap = text_similarity(source, translation);

    to_score(0.3 * word_ratio + 0.5 * overlap + 0.2 * char_ratio)
}

/// Capitalised terms of a text (names, places, coined words)
fn terms(text: &str) -> HashSet<&str> {
    CAPITALISED_TERM.find_iter(text).map(|m| m.as_str()).collect()
}

/// Terminology consistency against other units, 0-100
///
/// For every capitalised term of this unit's source that also appears in
/// another unit's source, checks whether the term is kept verbatim in both
/// translations or in neither. Units sharing no terms score 100.
pub fn consistency(source: &str, translation: &str, others: &[(String, String)]) -> u8 {
    let own_terms = terms(source);
    let mut checked = 0usize;
    let mut agreeing = 0usize;

    for (other_source, other_translation) in others {
        let other_terms = terms(other_source);
        for term in own_terms.intersection(&other_terms) {
            checked += 1;
            if translation.contains(term) == other_translation.contains(term) {
                agreeing += 1;
            }
        }
    }

    if checked == 0 {
        100
    } else {
        to_score(agreeing as f64 / checked as f64)
    }
}

fn trigram_counts(words: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for window in words.windows(3) {
        *counts.entry(window.join(" ")).or_insert(0) += 1;
    }
    counts
}

fn tag_balance(text: &str) -> usize {
    let mut balance: HashMap<String, i64> = HashMap::new();
    for cap in HTML_OPEN_TAG.captures_iter(text) {
        *balance.entry(cap[1].to_lowercase()).or_default() += 1;
    }
    for cap in HTML_CLOSE_TAG.captures_iter(text) {
        *balance.entry(cap[1].to_lowercase()).or_default() -= 1;
    }
    balance.values().filter(|v| **v != 0).count()
}

/// Look for common translation failures
pub fn detect_errors(source: &str, translation: &str) -> ErrorCounts {
    let mut counts = ErrorCounts::default();

    // Untranslated: long sentences that survive verbatim
    let source_sentences: HashSet<&str> = sentences(source).into_iter().collect();
    counts.untranslated = sentences(translation)
        .into_iter()
        .filter(|s| s.chars().count() > 20 && source_sentences.contains(s))
        .count();

    // Repeated phrases the source does not repeat
    let source_trigrams = trigram_counts(&words(source));
    counts.repeated_phrases = trigram_counts(&words(translation))
        .into_iter()
        .filter(|(gram, n)| *n >= 3 && *n > source_trigrams.get(gram).copied().unwrap_or(0))
        .count();

    // Formatting
    if translation.matches("**").count() % 2 != 0 {
        counts.formatting += 1;
    }
    if translation.matches('`').count() % 2 != 0 {
        counts.formatting += 1;
    }
    counts.formatting += tag_balance(translation).saturating_sub(tag_balance(source));
    let (source_prefix, _, _) = split_markers(source.trim());
    let (translation_prefix, _, _) = split_markers(translation.trim());
    if source_prefix.trim() != translation_prefix.trim() {
        counts.formatting += 1;
    }

    // Length anomalies
    let source_len = source.chars().count();
    if source_len >= 20 {
        let length_ratio = translation.chars().count() as f64 / source_len as f64;
        if !(0.3..=3.0).contains(&length_ratio) {
            counts.mistranslations += 1;
        }
    }

    counts
}

/// Whether a translation looks contaminated by the context examples
///
/// Two signals: a long source with a translation far too short for it, or
/// a translation that closely mirrors a context translation whose source has
/// little to do with the current one.
pub fn detect_context_bleeding(source: &str, translation: &str, context: &[Exchange]) -> bool {
    let source_words = source.split_whitespace().count();
    let translation_words = translation.split_whitespace().count();
    if source_words > 50 && (translation_words as f64) < source_words as f64 * 0.3 {
        return true;
    }

    context.iter().any(|exchange| {
        text_similarity(translation, &exchange.translation) > 0.8
            && text_similarity(source, &exchange.source) < 0.3
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Similarity Tests ==========

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(text_similarity("", ""), 1.0);
        assert_eq!(text_similarity("a b", "a b"), 1.0);
        assert_eq!(text_similarity("a b", "c d"), 0.0);
        assert!((text_similarity("a b c", "a b d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_ignores_case_and_punctuation() {
        assert_eq!(text_similarity("Hello, World!", "hello world"), 1.0);
    }

    // ========== Score Tests ==========

    #[test]
    fn test_fluency_empty_is_zero() {
        assert_eq!(fluency(""), 0);
        assert_eq!(fluency("..."), 0);
    }

    #[test]
    fn test_fluency_penalises_repetition() {
        let varied = fluency("The cat sat on a mat. A dog ran in the park. Birds sang loudly today.");
        let repetitive = fluency("very very very very very very good.");
        assert!(varied > repetitive);
        assert!(varied > 70);
    }

    #[test]
    fn test_adequacy_identical_is_full() {
        assert_eq!(adequacy("Same words here", "Same words here"), 100);
    }

    #[test]
    fn test_adequacy_rewards_similar_length() {
        let close = adequacy("one two three four", "unu doi trei patru");
        let far = adequacy("one two three four", "unu");
        assert!(close > far);
        // No shared words, equal lengths: 30 + 0 + 20
        assert_eq!(close, 50);
    }

    #[test]
    fn test_consistency_without_shared_terms() {
        let others = vec![("Nothing Shared".to_string(), "Nimic".to_string())];
        assert_eq!(consistency("Alice went home", "Alice a plecat", &others), 100);
    }

    #[test]
    fn test_consistency_detects_disagreement() {
        let others = vec![
            ("Gandalf came".to_string(), "Gandalf a venit".to_string()),
            ("Gandalf left".to_string(), "Vrăjitorul a plecat".to_string()),
        ];
        // Kept verbatim here: agrees with the first unit, not with the second
        assert_eq!(consistency("Gandalf smiled", "Gandalf a zâmbit", &others), 50);
    }

    #[test]
    fn test_report_overall() {
        let report = QualityReport::assess("Hello there.", "Hello there.", &[]);
        assert_eq!(report.scores.adequacy, 100);
        assert_eq!(report.scores.consistency, 100);
        assert_eq!(report.overall(), report.scores.overall());
    }

    // ========== Error Detection Tests ==========

    #[test]
    fn test_detects_untranslated_sentence() {
        let source = "This sentence is long enough to count. Short one.";
        let translation = "This sentence is long enough to count. Una scurtă.";
        assert_eq!(detect_errors(source, translation).untranslated, 1);
    }

    #[test]
    fn test_detects_repeated_phrases() {
        let source = "He said it once.";
        let translation = "a spus asta a spus asta a spus asta";
        assert!(detect_errors(source, translation).repeated_phrases >= 1);
    }

    #[test]
    fn test_detects_formatting_issues() {
        let errors = detect_errors("**bold** and `code`", "**gras and `cod");
        assert_eq!(errors.formatting, 2);

        let errors = detect_errors("## Title", "Titlu");
        assert_eq!(errors.formatting, 1);

        let errors = detect_errors("<em>word</em>", "<em>cuvânt");
        assert_eq!(errors.formatting, 1);
    }

    #[test]
    fn test_detects_length_anomaly() {
        let errors = detect_errors("This is a reasonably long source sentence.", "Da.");
        assert_eq!(errors.mistranslations, 1);
        assert_eq!(errors.total(), 1);
    }

    #[test]
    fn test_clean_translation_has_no_errors() {
        let errors = detect_errors("## The Road\n\nIt was late.", "## Drumul\n\nEra târziu.");
        assert_eq!(errors, ErrorCounts::default());
    }

    // ========== Context Bleeding Tests ==========

    #[test]
    fn test_bleeding_short_translation_of_long_source() {
        let source = "word ".repeat(60);
        assert!(detect_context_bleeding(&source, "prea scurt", &[]));
        assert!(!detect_context_bleeding(&source, &"cuvânt ".repeat(40), &[]));
    }

    #[test]
    fn test_bleeding_mirrors_unrelated_context() {
        let context = vec![Exchange::new(
            "The ship sailed at dawn",
            "Nava a plecat în zori",
        )];
        assert!(detect_context_bleeding(
            "She opened the letter",
            "Nava a plecat în zori",
            &context
        ));
        assert!(!detect_context_bleeding(
            "She opened the letter",
            "Ea a deschis scrisoarea",
            &context
        ));
    }
}
