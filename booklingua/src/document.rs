//! Document container adapters
//!
//! The pipeline only sees a document as an ordered list of [`SourceUnit`]s
//! and hands back an ordered list of [`FinalText`]s to write. Everything
//! format specific lives behind [`DocumentAdapter`].

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors from reading or writing a document container
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate unit index {0} in output")]
    DuplicateUnit(usize),
}

/// A unit as extracted from the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub index: usize,
    pub title: String,
    pub text: String,
}

/// Final text of one unit, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalText {
    pub index: usize,
    pub title: String,
    pub text: String,
}

/// Reader/writer for one document container format
pub trait DocumentAdapter: Send + Sync {
    /// Read the document and return its units in document order
    ///
    /// Must be deterministic: the same file always yields the same unit
    /// boundaries and indices.
    fn extract_units(&self, path: &Path) -> Result<Vec<SourceUnit>, DocumentError>;

    /// Write the units, ordered by index, to `path`
    ///
    /// Writing back unchanged texts must reproduce the structural markers
    /// of the source verbatim.
    fn write_document(&self, path: &Path, texts: &[FinalText]) -> Result<(), DocumentError>;

    /// Short format name used in logs
    fn format_name(&self) -> &'static str;

    /// Default output location for a translated copy of `input`
    fn output_path(&self, input: &Path, target_lang: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let file_name = match input.extension() {
            Some(ext) => format!("{}_{}.{}", stem, target_lang, ext.to_string_lossy()),
            None => format!("{}_{}", stem, target_lang),
        };
        input.with_file_name(file_name)
    }
}

/// Markdown adapter
///
/// Text before the first ATX heading becomes unit 0, then every heading
/// opens a new unit. Headings inside fenced code blocks are ignored. Unit
/// texts are exact slices of the file, so writing them back unchanged gives
/// the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownDocument;

impl MarkdownDocument {
    pub fn new() -> Self {
        Self
    }

    /// Split Markdown source into units
    ///
    /// # Example
    /// ```ignore
    /// let units = MarkdownDocument::split_units("Intro\n\n# One\n\nBody\n");
    /// assert_eq!(units.len(), 2);
    /// assert_eq!(units[1].title, "One");
    /// ```
    pub fn split_units(source: &str) -> Vec<SourceUnit> {
        // (start offset, title) of every unit
        let mut starts: Vec<(usize, String)> = Vec::new();
        let mut offset = 0;
        // Marker character and length of the open code fence
        let mut open_fence: Option<(u8, usize)> = None;

        for line in source.split_inclusive('\n') {
            match (open_fence, fence_marker(line)) {
                (None, Some(fence)) => open_fence = Some(fence),
                (Some((marker, len)), Some((closing, run)))
                    if closing == marker && run >= len && closes_fence(line) =>
                {
                    open_fence = None;
                }
                (None, None) => {
                    if let Some(title) = heading_title(line) {
                        starts.push((offset, title));
                    }
                }
                _ => {}
            }
            offset += line.len();
        }

        // Preamble before the first heading
        let has_preamble = starts.first().is_none_or(|(start, _)| *start > 0);
        if has_preamble && !source.is_empty() {
            starts.insert(0, (0, preamble_title(source)));
        }

        let mut units = Vec::with_capacity(starts.len());
        for (index, (start, title)) in starts.iter().enumerate() {
            let end = starts
                .get(index + 1)
                .map(|(next, _)| *next)
                .unwrap_or(source.len());
            units.push(SourceUnit {
                index,
                title: title.clone(),
                text: source[*start..end].to_string(),
            });
        }
        units
    }
}

/// Fence character and run length when the line starts a code fence
fn fence_marker(line: &str) -> Option<(u8, usize)> {
    let trimmed = line.trim_start();
    let marker = *trimmed.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let run = trimmed.bytes().take_while(|b| *b == marker).count();
    (run >= 3).then_some((marker, run))
}

/// A closing fence carries nothing after its marker run
fn closes_fence(line: &str) -> bool {
    let trimmed = line.trim();
    let first = trimmed.bytes().next();
    trimmed.bytes().all(|b| Some(b) == first)
}

/// Title of an ATX heading line (`# Title`), if the line is one
fn heading_title(line: &str) -> Option<String> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !(rest.starts_with(' ') || rest.starts_with('\t') || rest.trim().is_empty()) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim().to_string())
}

fn preamble_title(source: &str) -> String {
    source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(60).collect())
        .unwrap_or_default()
}

impl DocumentAdapter for MarkdownDocument {
    fn extract_units(&self, path: &Path) -> Result<Vec<SourceUnit>, DocumentError> {
        let source = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::split_units(&source))
    }

    fn write_document(&self, path: &Path, texts: &[FinalText]) -> Result<(), DocumentError> {
        let mut ordered: BTreeMap<usize, &str> = BTreeMap::new();
        for text in texts {
            if ordered.insert(text.index, &text.text).is_some() {
                return Err(DocumentError::DuplicateUnit(text.index));
            }
        }
        let output: String = ordered.into_values().collect();

        let write_err = |source| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, output).map_err(write_err)
    }

    fn format_name(&self) -> &'static str {
        "markdown"
    }
}
