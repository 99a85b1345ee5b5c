//! Persistent translation cache
//!
//! One embedded sled database per input document. It holds four trees:
//!
//! - `entries`: the current [`CacheEntry`] per (source lang, target lang,
//!   phase, normalized source)
//! - `history`: superseded entries, never deleted
//! - `units`: the [`UnitRecord`] of every unit per language pair
//! - `meta`: edition counters
//!
//! Every write is flushed before it returns, so a crash loses at most the
//! call that was in flight.

use crate::unit::{Phase, QualityScores, UnitRecord};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Field separator inside keys
const SEP: char = '\x1f';
/// Separator between an entry key and its history id
const HISTORY_SEP: u8 = 0x1e;

const INITIAL_LOCK_BACKOFF: Duration = Duration::from_millis(100);
const MAX_LOCK_BACKOFF: Duration = Duration::from_secs(2);

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal space regex"));

/// Errors from the cache store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store {} is locked by another process (gave up after {waited:?})", .path.display())]
    Locked { path: PathBuf, waited: Duration },
    #[error("store I/O error: {0}")]
    Io(#[from] sled::Error),
    #[error("corrupt store value under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode store value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot access {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid record on line {line}: {source}")]
    Import {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A cached result of one phase for one source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_lang: String,
    pub target_lang: String,
    pub phase: Phase,
    /// Source text as it was sent, before normalization
    pub source: String,
    /// The phase result (translation or proofread text)
    pub translation: String,
    pub edition: u32,
    pub model: String,
    pub duration_ms: u64,
    /// Unit that first produced this entry
    #[serde(default)]
    pub unit: Option<usize>,
    /// Chunk ordinal within the unit; `None` for a unit-level entry
    #[serde(default)]
    pub ordinal: Option<usize>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub scores: Option<QualityScores>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        source_lang: &str,
        target_lang: &str,
        phase: Phase,
        source: impl Into<String>,
        translation: impl Into<String>,
        edition: u32,
    ) -> Self {
        Self {
            source_lang: source_lang.to_lowercase(),
            target_lang: target_lang.to_lowercase(),
            phase,
            source: source.into(),
            translation: translation.into(),
            edition,
            model: String::new(),
            duration_ms: 0,
            unit: None,
            ordinal: None,
            created: Utc::now(),
            scores: None,
        }
    }

    pub fn key(&self) -> String {
        entry_key(&self.source_lang, &self.target_lang, self.phase, &self.source)
    }
}

/// Normalize source text for keying
///
/// Trims surrounding whitespace, converts CRLF to LF and collapses runs of
/// spaces and tabs.
pub fn normalize_source(text: &str) -> String {
    let text = text.trim().replace("\r\n", "\n");
    HORIZONTAL_SPACE.replace_all(&text, " ").into_owned()
}

fn entry_key(source_lang: &str, target_lang: &str, phase: Phase, source: &str) -> String {
    format!(
        "{}{SEP}{}{SEP}{}{SEP}{}",
        source_lang.to_lowercase(),
        target_lang.to_lowercase(),
        phase.as_str(),
        normalize_source(source)
    )
}

fn pair_prefix(source_lang: &str, target_lang: &str) -> String {
    format!(
        "{}{SEP}{}{SEP}",
        source_lang.to_lowercase(),
        target_lang.to_lowercase()
    )
}

fn unit_key(source_lang: &str, target_lang: &str, index: usize) -> String {
    format!("{}{:010}", pair_prefix(source_lang, target_lang), index)
}

fn edition_key(source_lang: &str, target_lang: &str) -> String {
    format!("edition{SEP}{}", pair_prefix(source_lang, target_lang))
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = key.as_bytes().to_vec();
    prefix.push(HISTORY_SEP);
    prefix
}

fn is_lock_error(err: &sled::Error) -> bool {
    match err {
        sled::Error::Io(io) => {
            io.kind() == io::ErrorKind::WouldBlock || io.to_string().contains("acquire lock")
        }
        _ => false,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(key: &[u8], bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        key: String::from_utf8_lossy(key).replace(SEP, "/"),
        source,
    })
}

/// Whether replacing `previous` with `entry` loses information worth keeping
fn supersedes(entry: &CacheEntry, previous: &CacheEntry) -> bool {
    normalize_source(&previous.translation) != normalize_source(&entry.translation)
        || previous.edition != entry.edition
        || previous.model != entry.model
}

/// Durable cache of phase results, unit records and edition counters
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: Db,
    entries: Tree,
    history: Tree,
    units: Tree,
    meta: Tree,
    path: PathBuf,
}

impl CacheStore {
    /// Open (or create) the store at `path`
    ///
    /// If another process holds the store, opening is retried with
    /// exponential backoff until `lock_timeout` has elapsed.
    ///
    /// # Arguments
    /// * `path` - Database directory
    /// * `lock_timeout` - How long to wait for a competing process
    ///
    /// # Returns
    /// * `Ok(CacheStore)` - The open store
    /// * `Err(StoreError::Locked)` - If the lock was not released in time
    /// * `Err(StoreError::Io)` - On any other storage failure
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let started = Instant::now();
        let mut backoff = INITIAL_LOCK_BACKOFF;

        let db = loop {
            match sled::Config::new().path(&path).open() {
                Ok(db) => break db,
                Err(e) if is_lock_error(&e) => {
                    let waited = started.elapsed();
                    if waited >= lock_timeout {
                        return Err(StoreError::Locked { path, waited });
                    }
                    debug!("Store {} is locked, retrying in {:?}", path.display(), backoff);
                    thread::sleep(backoff.min(lock_timeout - waited));
                    backoff = (backoff * 2).min(MAX_LOCK_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(Self {
            entries: db.open_tree("entries")?,
            history: db.open_tree("history")?,
            units: db.open_tree("units")?,
            meta: db.open_tree("meta")?,
            db,
            path,
        })
    }

    /// Default store location for an input document: `<stem>.lingua` beside it
    pub fn default_path(input: &Path) -> PathBuf {
        input.with_extension("lingua")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the current entry for a source text
    pub fn get(
        &self,
        source_lang: &str,
        target_lang: &str,
        source: &str,
        phase: Phase,
    ) -> StoreResult<Option<CacheEntry>> {
        let key = entry_key(source_lang, target_lang, phase, source);
        match self.entries.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(key.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace an entry
    ///
    /// A replaced entry is moved to history in the same transaction when it
    /// differs from the new one in translation, edition or model. The write
    /// is flushed to disk before returning.
    pub fn put(&self, entry: &CacheEntry) -> StoreResult<()> {
        let key = entry.key();
        let value = serde_json::to_vec(entry).map_err(StoreError::Encode)?;
        let mut history_key = history_prefix(&key);
        history_key.extend_from_slice(&self.db.generate_id()?.to_be_bytes());

        (&self.entries, &self.history)
            .transaction(|(entries, history)| {
                if let Some(previous) = entries.get(key.as_bytes())? {
                    let previous_entry: CacheEntry = serde_json::from_slice(&previous)
                        .map_err(ConflictableTransactionError::Abort)?;
                    if supersedes(entry, &previous_entry) {
                        history.insert(history_key.as_slice(), previous)?;
                    }
                }
                entries.insert(key.as_bytes(), value.as_slice())?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(source) => StoreError::Corrupt {
                    key: key.replace(SEP, "/"),
                    source,
                },
                TransactionError::Storage(e) => StoreError::Io(e),
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// Superseded entries for a source text, oldest first
    pub fn history(
        &self,
        source_lang: &str,
        target_lang: &str,
        source: &str,
        phase: Phase,
    ) -> StoreResult<Vec<CacheEntry>> {
        let key = entry_key(source_lang, target_lang, phase, source);
        self.history
            .scan_prefix(history_prefix(&key))
            .map(|item| {
                let (k, v) = item?;
                decode(&k, &v)
            })
            .collect()
    }

    /// Entries of a language pair in a phase, most recent first
    pub fn entries_for_phase(
        &self,
        source_lang: &str,
        target_lang: &str,
        phase: Phase,
    ) -> StoreResult<Vec<CacheEntry>> {
        let prefix = format!("{}{}{SEP}", pair_prefix(source_lang, target_lang), phase.as_str());
        let mut found = self
            .entries
            .scan_prefix(prefix.as_bytes())
            .map(|item| {
                let (k, v) = item?;
                decode(&k, &v)
            })
            .collect::<StoreResult<Vec<CacheEntry>>>()?;
        found.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(found)
    }

    /// Entries produced for one unit in a phase, most recent first
    pub fn entries_for_unit(
        &self,
        source_lang: &str,
        target_lang: &str,
        phase: Phase,
        unit: usize,
    ) -> StoreResult<Vec<CacheEntry>> {
        let mut found = self.entries_for_phase(source_lang, target_lang, phase)?;
        found.retain(|entry| entry.unit == Some(unit));
        Ok(found)
    }

    /// Every current entry, in key order
    pub fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        self.entries
            .iter()
            .map(|item| {
                let (k, v) = item?;
                decode(&k, &v)
            })
            .collect()
    }

    /// Insert or replace a unit record and flush
    pub fn put_unit(&self, unit: &UnitRecord) -> StoreResult<()> {
        let key = unit_key(&unit.source_lang, &unit.target_lang, unit.index);
        let value = serde_json::to_vec(unit).map_err(StoreError::Encode)?;
        self.units.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_unit(
        &self,
        source_lang: &str,
        target_lang: &str,
        index: usize,
    ) -> StoreResult<Option<UnitRecord>> {
        let key = unit_key(source_lang, target_lang, index);
        match self.units.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(key.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// All unit records of a language pair, ordered by index
    pub fn units(&self, source_lang: &str, target_lang: &str) -> StoreResult<Vec<UnitRecord>> {
        self.units
            .scan_prefix(pair_prefix(source_lang, target_lang).as_bytes())
            .map(|item| {
                let (k, v) = item?;
                decode(&k, &v)
            })
            .collect()
    }

    /// Latest edition of a language pair, `None` before the first extract
    pub fn edition(&self, source_lang: &str, target_lang: &str) -> StoreResult<Option<u32>> {
        let key = edition_key(source_lang, target_lang);
        Ok(self.meta.get(key.as_bytes())?.and_then(|bytes| {
            let raw: [u8; 4] = bytes.as_ref().try_into().ok()?;
            Some(u32::from_be_bytes(raw))
        }))
    }

    /// Increment the edition counter and return the new value
    ///
    /// The first call for a pair returns 1.
    pub fn next_edition(&self, source_lang: &str, target_lang: &str) -> StoreResult<u32> {
        let key = edition_key(source_lang, target_lang);
        let updated = self.meta.update_and_fetch(key.as_bytes(), |old| {
            let current = old
                .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
                .map(u32::from_be_bytes)
                .unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        self.db.flush()?;

        let edition = updated
            .and_then(|bytes| <[u8; 4]>::try_from(bytes.as_ref()).ok())
            .map(u32::from_be_bytes)
            .unwrap_or(1);
        info!(
            "Edition {} for {} -> {}",
            edition, source_lang, target_lang
        );
        Ok(edition)
    }

    /// Write every current entry to `path` as JSON Lines
    ///
    /// # Returns
    /// The number of entries written
    pub fn export_jsonl(&self, path: &Path) -> StoreResult<usize> {
        let file_err = |source| StoreError::File {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(file_err)?);

        let mut count = 0;
        for entry in self.entries()? {
            let line = serde_json::to_string(&entry).map_err(StoreError::Encode)?;
            writeln!(writer, "{}", line).map_err(file_err)?;
            count += 1;
        }
        writer.flush().map_err(file_err)?;

        info!("Exported {} entries to {}", count, path.display());
        Ok(count)
    }

    /// Load entries from a JSON Lines file written by [`Self::export_jsonl`]
    ///
    /// Each record goes through [`Self::put`], so existing entries with a
    /// different translation are archived rather than lost. Blank lines are
    /// skipped.
    ///
    /// # Returns
    /// The number of entries imported
    pub fn import_jsonl(&self, path: &Path) -> StoreResult<usize> {
        let file_err = |source| StoreError::File {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(file_err)?);

        let mut count = 0;
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(file_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: CacheEntry = serde_json::from_str(&line).map_err(|source| {
                StoreError::Import {
                    line: number + 1,
                    source,
                }
            })?;
            self.put(&entry)?;
            count += 1;
        }

        if count == 0 {
            warn!("No entries found in {}", path.display());
        } else {
            info!("Imported {} entries from {}", count, path.display());
        }
        Ok(count)
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
