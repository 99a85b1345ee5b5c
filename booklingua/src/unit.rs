//! Content unit model and the phase state machine
//!
//! A document is an ordered list of units (chapters or sections). Every unit
//! moves through a closed set of statuses as the pipeline phases run over it:
//!
//! ```text
//! pending → extracted → translated → proofread → built
//!               │            │            │
//!               ▼            ▼            ▼
//!      failed(translate) failed(proofread) failed(build)
//! ```
//!
//! A failed unit remembers the phase that failed, so the next run of that
//! phase picks it up again. Everything else only ever moves forward; the one
//! exception is [`UnitRecord::reset`], used when the source text changed or a
//! new edition was requested.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the extract → translate → proofread → build pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Extract,
    Translate,
    Proofread,
    Build,
}

impl Phase {
    /// All phases in pipeline order
    pub const ALL: [Phase; 4] = [
        Phase::Extract,
        Phase::Translate,
        Phase::Proofread,
        Phase::Build,
    ];

    /// Lowercase name, also used in store keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Translate => "translate",
            Phase::Proofread => "proofread",
            Phase::Build => "build",
        }
    }

    /// The status a unit reaches when this phase succeeds for it
    pub fn target_status(&self) -> UnitStatus {
        match self {
            Phase::Extract => UnitStatus::Extracted,
            Phase::Translate => UnitStatus::Translated,
            Phase::Proofread => UnitStatus::Proofread,
            Phase::Build => UnitStatus::Built,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "phase", rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Extracted,
    Translated,
    Proofread,
    Built,
    /// Failed during the given phase; that phase retries it on its next run
    Failed(Phase),
}

/// Error for a transition the state machine does not allow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition for unit {unit}: {from} -> {to}")]
pub struct TransitionError {
    pub unit: usize,
    pub from: UnitStatus,
    pub to: UnitStatus,
}

impl UnitStatus {
    /// Position in the forward progression. A failed unit ranks where it was
    /// before the failing phase started.
    pub fn rank(&self) -> u8 {
        match self {
            UnitStatus::Pending => 0,
            UnitStatus::Extracted => 1,
            UnitStatus::Translated => 2,
            UnitStatus::Proofread => 3,
            UnitStatus::Built => 4,
            UnitStatus::Failed(Phase::Extract) => 0,
            UnitStatus::Failed(Phase::Translate) => 1,
            UnitStatus::Failed(Phase::Proofread) => 2,
            UnitStatus::Failed(Phase::Build) => 2,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitStatus::Failed(_))
    }

    /// Whether `phase` should do work on a unit in this status
    ///
    /// Build accepts anything that has a translation, including units that
    /// were already built, because rebuilding is a pure read.
    pub fn is_ready_for(&self, phase: Phase) -> bool {
        match phase {
            Phase::Extract => matches!(self, UnitStatus::Pending | UnitStatus::Failed(Phase::Extract)),
            Phase::Translate => matches!(
                self,
                UnitStatus::Extracted | UnitStatus::Failed(Phase::Translate)
            ),
            Phase::Proofread => matches!(
                self,
                UnitStatus::Translated | UnitStatus::Failed(Phase::Proofread)
            ),
            Phase::Build => matches!(
                self,
                UnitStatus::Translated
                    | UnitStatus::Proofread
                    | UnitStatus::Built
                    | UnitStatus::Failed(Phase::Build)
            ),
        }
    }

    /// Whether the unit is already at or beyond what `phase` produces
    pub fn is_done_for(&self, phase: Phase) -> bool {
        !self.is_failed() && self.rank() >= phase.target_status().rank()
    }

    /// Check a transition against the state machine
    ///
    /// # Arguments
    /// * `unit` - Unit index, only used for the error message
    /// * `to` - The requested next status
    ///
    /// # Returns
    /// * `Ok(UnitStatus)` - The new status
    /// * `Err(TransitionError)` - If the move is not a legal edge
    pub fn advance(self, unit: usize, to: UnitStatus) -> Result<UnitStatus, TransitionError> {
        use UnitStatus::*;

        let legal = match (self, to) {
            (Pending | Failed(Phase::Extract), Extracted) => true,
            (Pending, Failed(Phase::Extract)) => true,
            (Extracted | Failed(Phase::Translate), Translated) => true,
            (Extracted | Failed(Phase::Translate), Failed(Phase::Translate)) => true,
            (Translated | Failed(Phase::Proofread), Proofread) => true,
            (Translated | Failed(Phase::Proofread), Failed(Phase::Proofread)) => true,
            (Translated | Proofread | Built | Failed(Phase::Build), Built) => true,
            (Translated | Proofread | Failed(Phase::Build), Failed(Phase::Build)) => true,
            _ => false,
        };

        if legal {
            Ok(to)
        } else {
            Err(TransitionError {
                unit,
                from: self,
                to,
            })
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Pending => f.write_str("pending"),
            UnitStatus::Extracted => f.write_str("extracted"),
            UnitStatus::Translated => f.write_str("translated"),
            UnitStatus::Proofread => f.write_str("proofread"),
            UnitStatus::Built => f.write_str("built"),
            UnitStatus::Failed(phase) => write!(f, "failed({})", phase),
        }
    }
}

/// Advisory quality scores, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScores {
    pub fluency: u8,
    pub adequacy: u8,
    pub consistency: u8,
}

impl QualityScores {
    /// Weighted overall score: 40% fluency, 40% adequacy, 20% consistency
    pub fn overall(&self) -> u8 {
        let weighted = f64::from(self.fluency) * 0.4
            + f64::from(self.adequacy) * 0.4
            + f64::from(self.consistency) * 0.2;
        weighted.round().clamp(0.0, 100.0) as u8
    }
}

/// Persistent record of one content unit for a language pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Stable index within the document
    pub index: usize,
    pub title: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Source text with its structural markers
    pub text: String,
    pub status: UnitStatus,
    /// Last error for a failed unit
    pub error: Option<String>,
    pub scores: Option<QualityScores>,
    /// Edition the unit was last (re)extracted for
    pub edition: u32,
    pub updated: DateTime<Utc>,
}

impl UnitRecord {
    /// Create a pending unit
    pub fn new(
        index: usize,
        title: impl Into<String>,
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        edition: u32,
    ) -> Self {
        Self {
            index,
            title: title.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            text: text.into(),
            status: UnitStatus::Pending,
            error: None,
            scores: None,
            edition,
            updated: Utc::now(),
        }
    }

    /// Move to `to`, validating the edge. Clears the error on success.
    pub fn transition(&mut self, to: UnitStatus) -> Result<(), TransitionError> {
        self.status = self.status.advance(self.index, to)?;
        if !to.is_failed() {
            self.error = None;
        }
        self.updated = Utc::now();
        Ok(())
    }

    /// Mark the unit failed in `phase`, keeping the error text
    pub fn fail(&mut self, phase: Phase, error: impl Into<String>) -> Result<(), TransitionError> {
        self.status = self.status.advance(self.index, UnitStatus::Failed(phase))?;
        self.error = Some(error.into());
        self.updated = Utc::now();
        Ok(())
    }

    /// Put the unit back to `extracted` with new text and edition
    ///
    /// Used when the source document changed under an existing unit or a new
    /// edition forces everything to be translated again.
    pub fn reset(&mut self, text: impl Into<String>, edition: u32) {
        self.text = text.into();
        self.edition = edition;
        self.status = UnitStatus::Extracted;
        self.error = None;
        self.scores = None;
        self.updated = Utc::now();
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Transition Tests ==========

    #[test]
    fn test_forward_path() {
        let mut unit = UnitRecord::new(1, "One", "Text", "english", "romanian", 1);
        unit.transition(UnitStatus::Extracted).unwrap();
        unit.transition(UnitStatus::Translated).unwrap();
        unit.transition(UnitStatus::Proofread).unwrap();
        unit.transition(UnitStatus::Built).unwrap();
        assert_eq!(unit.status, UnitStatus::Built);
    }

    #[test]
    fn test_build_without_proofread() {
        let status = UnitStatus::Translated;
        assert_eq!(status.advance(0, UnitStatus::Built), Ok(UnitStatus::Built));
    }

    #[test]
    fn test_rebuild_is_legal() {
        let status = UnitStatus::Built;
        assert_eq!(status.advance(0, UnitStatus::Built), Ok(UnitStatus::Built));
    }

    #[test]
    fn test_skipping_translate_is_illegal() {
        let err = UnitStatus::Extracted
            .advance(3, UnitStatus::Proofread)
            .unwrap_err();
        assert_eq!(err.unit, 3);
        assert_eq!(err.from, UnitStatus::Extracted);
        assert!(err.to_string().contains("extracted -> proofread"));
    }

    #[test]
    fn test_backwards_is_illegal() {
        assert!(
            UnitStatus::Translated
                .advance(0, UnitStatus::Extracted)
                .is_err()
        );
        assert!(UnitStatus::Built.advance(0, UnitStatus::Translated).is_err());
    }

    #[test]
    fn test_failed_retries_to_originating_phase() {
        let mut unit = UnitRecord::new(2, "Two", "Text", "english", "romanian", 1);
        unit.transition(UnitStatus::Extracted).unwrap();
        unit.fail(Phase::Translate, "timeout").unwrap();
        assert_eq!(unit.status, UnitStatus::Failed(Phase::Translate));
        assert_eq!(unit.error.as_deref(), Some("timeout"));

        // A failed unit cannot jump to a different phase's target
        assert!(unit.status.advance(2, UnitStatus::Proofread).is_err());

        unit.transition(UnitStatus::Translated).unwrap();
        assert_eq!(unit.error, None);
    }

    #[test]
    fn test_failed_can_fail_again() {
        let status = UnitStatus::Failed(Phase::Proofread);
        assert!(
            status
                .advance(0, UnitStatus::Failed(Phase::Proofread))
                .is_ok()
        );
    }

    // ========== Readiness Tests ==========

    #[test]
    fn test_ready_for_translate() {
        assert!(UnitStatus::Extracted.is_ready_for(Phase::Translate));
        assert!(UnitStatus::Failed(Phase::Translate).is_ready_for(Phase::Translate));
        assert!(!UnitStatus::Translated.is_ready_for(Phase::Translate));
        assert!(!UnitStatus::Failed(Phase::Proofread).is_ready_for(Phase::Translate));
    }

    #[test]
    fn test_ready_for_build() {
        assert!(UnitStatus::Translated.is_ready_for(Phase::Build));
        assert!(UnitStatus::Proofread.is_ready_for(Phase::Build));
        assert!(UnitStatus::Built.is_ready_for(Phase::Build));
        assert!(!UnitStatus::Extracted.is_ready_for(Phase::Build));
    }

    #[test]
    fn test_done_for() {
        assert!(UnitStatus::Built.is_done_for(Phase::Translate));
        assert!(UnitStatus::Translated.is_done_for(Phase::Translate));
        assert!(!UnitStatus::Extracted.is_done_for(Phase::Translate));
        assert!(!UnitStatus::Failed(Phase::Proofread).is_done_for(Phase::Proofread));
    }

    // ========== Record Tests ==========

    #[test]
    fn test_reset_returns_to_extracted() {
        let mut unit = UnitRecord::new(0, "Intro", "Old", "english", "romanian", 1);
        unit.transition(UnitStatus::Extracted).unwrap();
        unit.transition(UnitStatus::Translated).unwrap();
        unit.scores = Some(QualityScores {
            fluency: 90,
            adequacy: 80,
            consistency: 100,
        });

        unit.reset("New", 2);
        assert_eq!(unit.status, UnitStatus::Extracted);
        assert_eq!(unit.text, "New");
        assert_eq!(unit.edition, 2);
        assert_eq!(unit.scores, None);
    }

    #[test]
    fn test_status_serde_shape() {
        let json = serde_json::to_string(&UnitStatus::Failed(Phase::Translate)).unwrap();
        assert_eq!(json, r#"{"status":"failed","phase":"translate"}"#);
        let back: UnitStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UnitStatus::Failed(Phase::Translate));

        let json = serde_json::to_string(&UnitStatus::Built).unwrap();
        assert_eq!(json, r#"{"status":"built"}"#);
    }

    #[test]
    fn test_overall_score() {
        let scores = QualityScores {
            fluency: 80,
            adequacy: 60,
            consistency: 100,
        };
        assert_eq!(scores.overall(), 76);
    }
}
