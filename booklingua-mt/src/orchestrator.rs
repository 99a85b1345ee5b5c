//! Phase orchestrator
//!
//! Drives extract → translate → proofread → build over the units of one
//! document. All state lives in the [`CacheStore`]; the orchestrator itself
//! only holds what one run needs (settings, the throttle, the resolved
//! edition), so any run can be interrupted and the next one picks up where
//! it stopped.
//!
//! Per-unit failures are recorded on the unit and in the [`PhaseReport`];
//! only store and document errors abort a run.
//!
//! # Example
//!
//! ```ignore
//! use booklingua::{CacheStore, MarkdownDocument, Phase};
//! use booklingua_mt::{MockMode, MockTranslator, Orchestrator, PipelineSettings};
//! use std::sync::Arc;
//!
//! let store = CacheStore::open("book.lingua", Duration::from_secs(10))?;
//! let mut orchestrator = Orchestrator::new(
//!     store,
//!     Arc::new(MockTranslator::new(MockMode::Suffix)),
//!     Arc::new(MarkdownDocument),
//!     PipelineSettings::new("english", "romanian"),
//! )?;
//! let summary = orchestrator
//!     .run(&[Phase::Extract, Phase::Translate, Phase::Build], "book.md".as_ref(), "book_ro.md".as_ref())
//!     .await?;
//! assert!(summary.failed_units().is_empty());
//! ```

use crate::config::PipelineSettings;
use crate::context::{ContextManager, Exchange, sample_paragraphs};
use crate::error::{MtError, MtResult, PipelineError, PipelineResult};
use crate::quality::{QualityReport, detect_context_bleeding};
use crate::throttle::Throttle;
use crate::translator::MachineTranslator;
use booklingua::{
    CacheEntry, CacheStore, ChunkError, DocumentAdapter, FinalText, Phase, QualityScores,
    StoreError, StoreResult, TextChunk, TransitionError, UnitRecord, UnitStatus, chunk,
    needs_translation, reconstruct, split_markers,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Context exchanges kept when a translation is retried for bleeding
const REDUCED_CONTEXT: usize = 2;

/// Outcome of one phase over the selected units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Units the phase completed
    pub processed: Vec<usize>,
    /// Units already done or not ready
    pub skipped: Vec<usize>,
    /// Units that failed, with the error
    pub failed: Vec<(usize, String)>,
    /// Chunks and units served from the cache
    pub cache_hits: usize,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            processed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cache_hits: 0,
        }
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} skipped, {} failed, {} cache hits",
            self.phase,
            self.processed.len(),
            self.skipped.len(),
            self.failed.len(),
            self.cache_hits
        )
    }
}

/// Reports of every phase of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<PhaseReport>,
    /// Document written by the build phase, if it ran and had units
    pub output: Option<PathBuf>,
}

impl RunSummary {
    /// Indices of units that failed in any phase, sorted
    pub fn failed_units(&self) -> Vec<usize> {
        let mut failed: Vec<usize> = self
            .reports
            .iter()
            .flat_map(|r| r.failed.iter().map(|(index, _)| *index))
            .collect();
        failed.sort_unstable();
        failed.dedup();
        failed
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.failed.is_empty())
    }

    pub fn report(&self, phase: Phase) -> Option<&PhaseReport> {
        self.reports.iter().find(|r| r.phase == phase)
    }
}

/// Why a unit step stopped
enum StepError {
    /// The unit failed; the run goes on
    Unit(String),
    /// The run cannot go on
    Fatal(PipelineError),
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        StepError::Fatal(err.into())
    }
}

impl From<TransitionError> for StepError {
    fn from(err: TransitionError) -> Self {
        StepError::Fatal(err.into())
    }
}

impl From<MtError> for StepError {
    fn from(err: MtError) -> Self {
        StepError::Unit(err.to_string())
    }
}

impl From<ChunkError> for StepError {
    fn from(err: ChunkError) -> Self {
        StepError::Unit(err.to_string())
    }
}

/// Result of translating or proofreading one unit
struct UnitOutcome {
    scores: Option<QualityScores>,
    cache_hits: usize,
}

/// Drives the pipeline phases over one document's store
pub struct Orchestrator {
    store: CacheStore,
    translator: Arc<dyn MachineTranslator>,
    adapter: Arc<dyn DocumentAdapter>,
    settings: PipelineSettings,
    throttle: Throttle,
    /// Edition of this run, resolved on first use
    edition: Option<u32>,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// # Returns
    /// * `Ok(Self)` - Ready to run phases
    /// * `Err(PipelineError::Config)` - If the settings are invalid
    pub fn new(
        store: CacheStore,
        translator: Arc<dyn MachineTranslator>,
        adapter: Arc<dyn DocumentAdapter>,
        settings: PipelineSettings,
    ) -> PipelineResult<Self> {
        settings.validate()?;
        Ok(Self {
            throttle: Throttle::new(settings.throttle),
            store,
            translator,
            adapter,
            settings,
            edition: None,
        })
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the given phases in pipeline order
    ///
    /// # Arguments
    /// * `phases` - Phases to run; duplicates and order are ignored
    /// * `input` - Source document, read by extract
    /// * `output` - Target document, written by build
    pub async fn run(
        &mut self,
        phases: &[Phase],
        input: &Path,
        output: &Path,
    ) -> PipelineResult<RunSummary> {
        let mut phases = phases.to_vec();
        phases.sort();
        phases.dedup();

        let mut summary = RunSummary::default();
        for phase in phases {
            info!("Starting {} phase", phase);
            let report = match phase {
                Phase::Extract => self.extract(input)?,
                Phase::Translate => self.translate().await?,
                Phase::Proofread => self.proofread().await?,
                Phase::Build => {
                    let report = self.build(output)?;
                    if !report.processed.is_empty() {
                        summary.output = Some(output.to_path_buf());
                    }
                    report
                }
            };
            info!("Finished {}", report);
            summary.reports.push(report);
        }

        self.store.flush()?;
        Ok(summary)
    }

    /// Edition of this run
    ///
    /// With a new edition the counter is bumped once per run; otherwise the
    /// latest edition is used, and edition 1 is created if none exists.
    fn edition(&mut self) -> StoreResult<u32> {
        if let Some(edition) = self.edition {
            return Ok(edition);
        }
        let (src, tgt) = (&self.settings.source_lang, &self.settings.target_lang);
        let edition = match self.store.edition(src, tgt)? {
            Some(current) if !self.settings.new_edition => current,
            _ => self.store.next_edition(src, tgt)?,
        };
        self.edition = Some(edition);
        Ok(edition)
    }

    /// Selected unit records, ordered by index
    fn selected_units(&self) -> StoreResult<Vec<UnitRecord>> {
        let units = self
            .store
            .units(&self.settings.source_lang, &self.settings.target_lang)?;
        Ok(units
            .into_iter()
            .filter(|u| self.settings.selection.contains(u.index))
            .collect())
    }

    /// Read the document and seed or refresh unit records
    pub fn extract(&mut self, input: &Path) -> PipelineResult<PhaseReport> {
        let edition = self.edition()?;
        let units = self.adapter.extract_units(input)?;
        info!(
            "Extracted {} units from {} ({})",
            units.len(),
            input.display(),
            self.adapter.format_name()
        );

        let last = units.iter().map(|u| u.index).max();
        if let Some(max) = self.settings.selection.max()
            && last.is_none_or(|last| max > last)
        {
            warn!(
                "Selection {} reaches past the last unit of {}",
                self.settings.selection,
                input.display()
            );
        }

        let (src, tgt) = (&self.settings.source_lang, &self.settings.target_lang);
        let mut report = PhaseReport::new(Phase::Extract);
        for source in units {
            if !self.settings.selection.contains(source.index) {
                continue;
            }

            match self.store.get_unit(src, tgt, source.index)? {
                None => {
                    let mut record =
                        UnitRecord::new(source.index, source.title, source.text, src, tgt, edition);
                    record.transition(UnitStatus::Extracted)?;
                    self.store.put_unit(&record)?;
                    report.processed.push(record.index);
                }
                Some(mut record) => {
                    let changed = record.text != source.text;
                    let superseded = self.settings.new_edition && record.edition < edition;
                    if changed || superseded {
                        if changed {
                            info!("Unit {} changed in the source, resetting", record.index);
                        }
                        record.title = source.title;
                        record.reset(source.text, edition);
                        self.store.put_unit(&record)?;
                        report.processed.push(record.index);
                    } else if record.status.is_ready_for(Phase::Extract) {
                        record.transition(UnitStatus::Extracted)?;
                        self.store.put_unit(&record)?;
                        report.processed.push(record.index);
                    } else {
                        report.skipped.push(record.index);
                    }
                }
            }
        }
        Ok(report)
    }

    /// Translate every selected unit that is extracted or failed translation
    pub async fn translate(&mut self) -> PipelineResult<PhaseReport> {
        let edition = self.edition()?;
        let mut report = PhaseReport::new(Phase::Translate);
        let mut contexts = ContextManager::new(self.settings.context_size);

        for mut record in self.selected_units()? {
            if self.settings.new_edition
                && record.edition < edition
                && record.status != UnitStatus::Pending
            {
                debug!("Unit {} reset for edition {}", record.index, edition);
                record.reset(record.text.clone(), edition);
                self.store.put_unit(&record)?;
            }

            if !record.status.is_ready_for(Phase::Translate) {
                if !record.status.is_done_for(Phase::Translate) {
                    warn!("Unit {} is {}, not ready to translate", record.index, record.status);
                }
                report.skipped.push(record.index);
                continue;
            }

            info!(
                "Translating unit {} '{}' ({} words)",
                record.index,
                record.title,
                record.word_count()
            );
            match self.translate_unit(&record, &mut contexts, edition).await {
                Ok(outcome) => {
                    record.scores = outcome.scores;
                    record.transition(UnitStatus::Translated)?;
                    self.store.put_unit(&record)?;
                    report.cache_hits += outcome.cache_hits;
                    report.processed.push(record.index);
                }
                Err(StepError::Unit(error)) => {
                    warn!("Unit {} failed to translate: {}", record.index, error);
                    record.fail(Phase::Translate, error.clone())?;
                    self.store.put_unit(&record)?;
                    report.failed.push((record.index, error));
                }
                Err(StepError::Fatal(err)) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Proofread every selected unit that is translated or failed proofreading
    pub async fn proofread(&mut self) -> PipelineResult<PhaseReport> {
        let edition = self.edition()?;
        let mut report = PhaseReport::new(Phase::Proofread);

        for mut record in self.selected_units()? {
            if !record.status.is_ready_for(Phase::Proofread) {
                if !record.status.is_done_for(Phase::Proofread) {
                    warn!("Unit {} is {}, not ready to proofread", record.index, record.status);
                }
                report.skipped.push(record.index);
                continue;
            }

            info!("Proofreading unit {} '{}'", record.index, record.title);
            match self.proofread_unit(&record, edition).await {
                Ok(outcome) => {
                    record.transition(UnitStatus::Proofread)?;
                    self.store.put_unit(&record)?;
                    report.cache_hits += outcome.cache_hits;
                    report.processed.push(record.index);
                }
                Err(StepError::Unit(error)) => {
                    warn!("Unit {} failed to proofread: {}", record.index, error);
                    record.fail(Phase::Proofread, error.clone())?;
                    self.store.put_unit(&record)?;
                    report.failed.push((record.index, error));
                }
                Err(StepError::Fatal(err)) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Write the output document from cached results
    ///
    /// Never calls the translation service. Only selected units that are
    /// ready are written, in index order.
    pub fn build(&mut self, output: &Path) -> PipelineResult<PhaseReport> {
        let mut report = PhaseReport::new(Phase::Build);
        let mut texts = Vec::new();
        let mut ready = Vec::new();

        for mut record in self.selected_units()? {
            if !record.status.is_ready_for(Phase::Build) {
                warn!("Unit {} is {}, not ready to build", record.index, record.status);
                report.skipped.push(record.index);
                continue;
            }

            match self.final_entry(&record.text)? {
                Some(entry) => {
                    texts.push(FinalText {
                        index: record.index,
                        title: record.title.clone(),
                        text: entry.translation,
                    });
                    ready.push(record);
                }
                None => {
                    let error = "no cached translation".to_string();
                    match record.fail(Phase::Build, error.clone()) {
                        Ok(()) => {
                            self.store.put_unit(&record)?;
                            report.failed.push((record.index, error));
                        }
                        Err(_) => {
                            warn!("Unit {} is built but has no cached translation", record.index);
                            report.skipped.push(record.index);
                        }
                    }
                }
            }
        }

        if texts.is_empty() {
            warn!("No units ready to build, {} not written", output.display());
            return Ok(report);
        }

        self.adapter.write_document(output, &texts)?;
        info!("Wrote {} units to {}", texts.len(), output.display());

        for mut record in ready {
            record.transition(UnitStatus::Built)?;
            self.store.put_unit(&record)?;
            report.processed.push(record.index);
        }
        Ok(report)
    }

    /// Current unit-level entry for a unit text, any edition
    fn unit_entry(&self, text: &str, phase: Phase) -> StoreResult<Option<CacheEntry>> {
        Ok(self
            .store
            .get(&self.settings.source_lang, &self.settings.target_lang, text, phase)?
            .filter(|e| e.ordinal.is_none()))
    }

    /// An entry that may be reused instead of calling the service
    ///
    /// Under a new edition only entries of this edition count.
    fn reusable(
        &self,
        source_lang: &str,
        target_lang: &str,
        source: &str,
        phase: Phase,
        edition: u32,
    ) -> StoreResult<Option<CacheEntry>> {
        Ok(self
            .store
            .get(source_lang, target_lang, source, phase)?
            .filter(|e| !self.settings.new_edition || e.edition >= edition))
    }

    /// Proofread text if it is at least as new as the translation, else the translation
    fn final_entry(&self, text: &str) -> StoreResult<Option<CacheEntry>> {
        let translated = self.unit_entry(text, Phase::Translate)?;
        let proofread = self.unit_entry(text, Phase::Proofread)?;
        Ok(match (proofread, translated) {
            (Some(p), Some(t)) if p.edition >= t.edition => Some(p),
            (Some(p), None) => Some(p),
            (_, t) => t,
        })
    }

    /// (source, translation) of other translated units, for consistency scoring
    fn quality_peers(&self, exclude: usize) -> StoreResult<Vec<(String, String)>> {
        let mut peers = Vec::new();
        let units = self
            .store
            .units(&self.settings.source_lang, &self.settings.target_lang)?;
        for record in units {
            if record.index == exclude || record.status.rank() < UnitStatus::Translated.rank() {
                continue;
            }
            if let Some(entry) = self.unit_entry(&record.text, Phase::Translate)? {
                peers.push((record.text, entry.translation));
            }
        }
        Ok(peers)
    }

    fn new_entry(
        &self,
        languages: (&str, &str),
        phase: Phase,
        source: &str,
        translation: &str,
        edition: u32,
    ) -> CacheEntry {
        let mut entry = CacheEntry::new(languages.0, languages.1, phase, source, translation, edition);
        entry.model = self.translator.model().to_string();
        entry
    }

    /// Translate one piece of text through the throttle and retry policy
    async fn call_translate(&self, text: &str, context: &[Exchange], label: &str) -> MtResult<String> {
        let translator = &self.translator;
        let (src, tgt) = (
            self.settings.source_lang.as_str(),
            self.settings.target_lang.as_str(),
        );
        self.settings
            .retry
            .run(&self.throttle, label, || async move {
                let reply = translator.translate(text, src, tgt, context).await?;
                if reply.trim().is_empty() {
                    return Err(MtError::InvalidResponse("empty translation".to_string()));
                }
                Ok(reply)
            })
            .await
    }

    /// Proofread one piece of text through the throttle and retry policy
    async fn call_proofread(&self, text: &str, label: &str) -> MtResult<String> {
        let translator = &self.translator;
        let lang = self.settings.target_lang.as_str();
        self.settings
            .retry
            .run(&self.throttle, label, || async move {
                let reply = translator.proofread(text, lang).await?;
                if reply.trim().is_empty() {
                    return Err(MtError::InvalidResponse("empty proofreading".to_string()));
                }
                Ok(reply)
            })
            .await
    }

    /// Top up the window of a unit from cached translations
    ///
    /// Chunks of the same unit come first, then translated pairs from other
    /// units of the language pair.
    fn prefill_context(
        &self,
        contexts: &mut ContextManager,
        index: usize,
        edition: u32,
    ) -> StoreResult<()> {
        let limit = self.settings.prefill_size;
        if contexts.window(index).len() >= limit {
            return Ok(());
        }

        let (own, others): (Vec<CacheEntry>, Vec<CacheEntry>) = self
            .store
            .entries_for_phase(
                &self.settings.source_lang,
                &self.settings.target_lang,
                Phase::Translate,
            )?
            .into_iter()
            .filter(|e| !self.settings.new_edition || e.edition >= edition)
            .partition(|e| e.unit == Some(index));
        let own: Vec<CacheEntry> = own.into_iter().filter(|e| e.ordinal.is_some()).collect();

        let same_unit = contexts.prefill(index, &own, limit);
        let other_units = contexts.prefill(index, &others, limit);
        if same_unit + other_units > 0 {
            debug!(
                "Prefilled context of unit {} with {} exchanges ({} from other units)",
                index,
                same_unit + other_units,
                other_units
            );
        }
        Ok(())
    }

    /// Seed an empty window from paragraphs already done in this unit
    ///
    /// The samples are translated but not stored.
    async fn prime_context(&self, contexts: &mut ContextManager, index: usize, done: &str) {
        for paragraph in sample_paragraphs(done, self.settings.prefill_size) {
            let (_, core, _) = split_markers(&paragraph);
            match self.call_translate(core, &[], "Context sample").await {
                Ok(translation) => {
                    contexts.record(index, core, &translation);
                }
                Err(err) => debug!("Skipping context sample for unit {}: {}", index, err),
            }
        }
        debug!(
            "Primed context of unit {} with {} exchanges",
            index,
            contexts.window(index).len()
        );
    }

    async fn translate_unit(
        &self,
        record: &UnitRecord,
        contexts: &mut ContextManager,
        edition: u32,
    ) -> Result<UnitOutcome, StepError> {
        let (src, tgt) = (
            self.settings.source_lang.as_str(),
            self.settings.target_lang.as_str(),
        );
        let index = record.index;

        if let Some(hit) = self
            .reusable(src, tgt, &record.text, Phase::Translate, edition)?
            .filter(|e| e.ordinal.is_none())
        {
            debug!("Unit {} served from cache", index);
            return Ok(UnitOutcome {
                scores: hit.scores,
                cache_hits: 1,
            });
        }

        if contexts.begin_chapter(index, paragraph_count(&record.text)) {
            debug!("Unit {} is short, keeping the previous context", index);
        }
        self.prefill_context(contexts, index, edition)?;

        let started = Instant::now();
        let chunks = chunk(index, &record.text, self.settings.max_chunk_chars);
        let mut translated: Vec<TextChunk> = Vec::with_capacity(chunks.len());
        let mut cache_hits = 0;
        let mut primed = false;

        for piece in &chunks {
            let body = piece.body();
            if !needs_translation(body) || self.settings.is_copy() {
                translated.push(piece.clone());
                continue;
            }

            if let Some(hit) = self.reusable(src, tgt, body, Phase::Translate, edition)? {
                debug!("Cache hit for unit {} chunk {}/{}", index, piece.ordinal + 1, piece.total);
                contexts.record(index, body, &hit.translation);
                translated.push(piece.rewrap(&hit.translation));
                cache_hits += 1;
                continue;
            }

            if cache_hits > 0 && !primed && contexts.window(index).is_empty() {
                let done: String = chunks[..piece.ordinal].iter().map(|c| c.text.as_str()).collect();
                self.prime_context(contexts, index, &done).await;
                primed = true;
            }

            let label = format!("Unit {} chunk {}/{}", index, piece.ordinal + 1, piece.total);
            let (prefix, core, suffix) = split_markers(body);
            let call_started = Instant::now();

            let context = contexts.window(index).limited(self.settings.context_word_budget);
            let mut output = self.call_translate(core, &context, &label).await?;
            if detect_context_bleeding(core, &output, &context) {
                warn!("{}: translation looks contaminated by context, retrying", label);
                let reduced: Vec<Exchange> = contexts.window(index).recent(REDUCED_CONTEXT);
                output = self.call_translate(core, &reduced, &label).await?;
            }

            let full = format!("{}{}{}", prefix, output.trim(), suffix);
            let mut entry = self.new_entry((src, tgt), Phase::Translate, body, &full, edition);
            entry.duration_ms = call_started.elapsed().as_millis() as u64;
            entry.unit = Some(index);
            entry.ordinal = Some(piece.ordinal);
            self.store.put(&entry)?;

            contexts.record(index, body, &full);
            translated.push(piece.rewrap(&full));
        }

        let text = reconstruct(index, &translated)?;
        let quality = QualityReport::assess(&record.text, &text, &self.quality_peers(index)?);
        info!(
            "Unit {} quality: fluency {}, adequacy {}, consistency {} (overall {})",
            index,
            quality.scores.fluency,
            quality.scores.adequacy,
            quality.scores.consistency,
            quality.overall()
        );
        if quality.errors.total() > 0 {
            warn!("Unit {} has suspected issues: {:?}", index, quality.errors);
        }

        let mut entry = self.new_entry((src, tgt), Phase::Translate, &record.text, &text, edition);
        entry.duration_ms = started.elapsed().as_millis() as u64;
        entry.unit = Some(index);
        entry.scores = Some(quality.scores);
        self.store.put(&entry)?;

        Ok(UnitOutcome {
            scores: Some(quality.scores),
            cache_hits,
        })
    }

    async fn proofread_unit(&self, record: &UnitRecord, edition: u32) -> Result<UnitOutcome, StepError> {
        let (src, tgt) = (
            self.settings.source_lang.as_str(),
            self.settings.target_lang.as_str(),
        );
        let index = record.index;

        let translation = self
            .unit_entry(&record.text, Phase::Translate)?
            .ok_or_else(|| StepError::Unit("no cached translation to proofread".to_string()))?;

        if let Some(done) = self.reusable(src, tgt, &record.text, Phase::Proofread, edition)? {
            if done.ordinal.is_none() && done.edition >= translation.edition {
                debug!("Unit {} proofreading served from cache", index);
                return Ok(UnitOutcome {
                    scores: translation.scores,
                    cache_hits: 1,
                });
            }
        }

        let started = Instant::now();
        let chunks = chunk(index, &translation.translation, self.settings.max_chunk_chars);
        let mut revised: Vec<TextChunk> = Vec::with_capacity(chunks.len());
        let mut cache_hits = 0;

        for piece in &chunks {
            let body = piece.body();
            if !needs_translation(body) {
                revised.push(piece.clone());
                continue;
            }

            // Proofreading depends only on the target text
            if let Some(hit) = self.reusable(tgt, tgt, body, Phase::Proofread, edition)? {
                revised.push(piece.rewrap(&hit.translation));
                cache_hits += 1;
                continue;
            }

            let label = format!("Unit {} proofread {}/{}", index, piece.ordinal + 1, piece.total);
            let (prefix, core, suffix) = split_markers(body);
            let call_started = Instant::now();
            let output = self.call_proofread(core, &label).await?;

            let full = format!("{}{}{}", prefix, output.trim(), suffix);
            let mut entry = self.new_entry((tgt, tgt), Phase::Proofread, body, &full, edition);
            entry.duration_ms = call_started.elapsed().as_millis() as u64;
            entry.unit = Some(index);
            entry.ordinal = Some(piece.ordinal);
            self.store.put(&entry)?;

            revised.push(piece.rewrap(&full));
        }

        let text = reconstruct(index, &revised)?;
        let mut entry = self.new_entry((src, tgt), Phase::Proofread, &record.text, &text, edition);
        entry.duration_ms = started.elapsed().as_millis() as u64;
        entry.unit = Some(index);
        entry.scores = translation.scores;
        self.store.put(&entry)?;

        Ok(UnitOutcome {
            scores: translation.scores,
            cache_hits,
        })
    }
}

/// Paragraphs of a unit with something to translate
fn paragraph_count(text: &str) -> usize {
    text.split("\n\n")
        .filter(|p| needs_translation(p.trim()))
        .count()
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.store.path())
            .field("provider", &self.translator.provider_name())
            .field("format", &self.adapter.format_name())
            .field("settings", &self.settings)
            .field("edition", &self.edition)
            .finish()
    }
}
