use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Indent used for corpus files.
const CORPUS_INDENT: &[u8] = b"    ";

/// One spoken line attributed to a speaker on one source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueEntry {
    pub source_title: String,
    pub speaker: String,
    pub text: String,
}

/// A paragraph without a speaker separator. Persisted as `[title] text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeLine {
    pub source_title: String,
    pub text: String,
}

impl fmt::Display for NarrativeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source_title, self.text)
    }
}

/// Ordered dialogue collection. Order is page-visit order then paragraph order.
pub type Corpus = Vec<DialogueEntry>;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("malformed corpus {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub fn load(path: &Path) -> Result<Corpus, CorpusError> {
    load_as(path)
}

/// Records as stored, without narrowing them to `DialogueEntry`. Merging goes
/// through this so fields the typed view does not know about survive a rewrite.
pub fn load_records(path: &Path) -> Result<Vec<Value>, CorpusError> {
    load_as(path)
}

fn load_as<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CorpusError> {
    let raw = fs::read_to_string(path).map_err(|source| CorpusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CorpusError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the corpus through a sibling temp file so a failure never leaves a
/// half-written file behind.
pub fn save<T: Serialize>(path: &Path, entries: &[T]) -> Result<(), CorpusError> {
    let bytes = to_pretty_json(entries, CORPUS_INDENT).map_err(|source| CorpusError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    write_replace(path, &bytes).map_err(|source| CorpusError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Existing entries first, then the incoming batch. No deduplication:
/// merging the same batch twice duplicates it.
pub fn merge<T>(existing: Option<Vec<T>>, incoming: Vec<T>) -> Vec<T> {
    match existing {
        None => incoming,
        Some(mut corpus) => {
            corpus.extend(incoming);
            corpus
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub initial: usize,
    pub added: usize,
    pub total: usize,
    /// The main file did not exist and the batch was moved into place.
    pub renamed: bool,
}

/// Merge the batch at `extracted` into the corpus at `main`.
///
/// Returns `Ok(None)` when there is no batch file. A malformed main corpus
/// aborts the merge and leaves the file untouched.
pub fn merge_files(extracted: &Path, main: &Path) -> Result<Option<MergeReport>, CorpusError> {
    if !extracted.exists() {
        warn!("No extracted batch at {:?}, nothing to merge", extracted);
        return Ok(None);
    }

    let incoming = load_records(extracted)?;
    let added = incoming.len();

    if !main.exists() {
        info!("{:?} not found, moving batch into place", main);
        ensure_parent(main).and_then(|_| fs::rename(extracted, main)).map_err(|source| {
            CorpusError::Write {
                path: main.to_path_buf(),
                source,
            }
        })?;
        return Ok(Some(MergeReport {
            initial: 0,
            added,
            total: added,
            renamed: true,
        }));
    }

    let existing = load_records(main)?;
    let initial = existing.len();
    let merged = merge(Some(existing), incoming);
    save(main, &merged)?;

    Ok(Some(MergeReport {
        initial,
        added,
        total: merged.len(),
        renamed: false,
    }))
}

/// Overwrite the narrative artifact with one `[title] text` line per entry.
pub fn write_narratives(path: &Path, lines: &[NarrativeLine]) -> io::Result<()> {
    let body = lines
        .iter()
        .map(NarrativeLine::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    ensure_parent(path)?;
    fs::write(path, body)
}

/// Append handle on the failed-URL manifest. A newline separates this run's
/// URLs from whatever the file already held.
pub struct ErrorManifest {
    writer: BufWriter<File>,
    needs_separator: bool,
}

impl ErrorManifest {
    pub fn open(path: &Path) -> io::Result<Self> {
        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        ensure_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ErrorManifest {
            writer: BufWriter::new(file),
            needs_separator: has_content,
        })
    }

    pub fn write_batch(&mut self, urls: &[String]) -> io::Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        if self.needs_separator {
            self.writer.write_all(b"\n")?;
        }
        self.writer.write_all(urls.join("\n").as_bytes())?;
        self.needs_separator = true;
        Ok(())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Append failed URLs; does not touch the file when there are none.
pub fn append_failed_urls(path: &Path, urls: &[String]) -> io::Result<()> {
    if urls.is_empty() {
        return Ok(());
    }
    let mut manifest = ErrorManifest::open(path)?;
    manifest.write_batch(urls)?;
    manifest.close()
}

/// Pretty JSON with the given indent; non-ASCII is written as-is.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T, indent: &[u8]) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Replace `path` with `bytes` via a temp file in the same directory.
pub fn write_replace(path: &Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.tmp", file_name));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

// ── Tests ──
