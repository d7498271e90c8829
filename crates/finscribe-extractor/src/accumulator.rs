//! Durable, append-only result set with resume support
//!
//! The accumulator owns two files: the JSON array of records consumed by the
//! exporter (`X.json`) and a checkpoint next to it (`X.json.checkpoint`) that
//! records which batches have been committed. Both are replaced atomically
//! on every commit, records first, so the checkpoint never claims records
//! the array does not hold.

use crate::error::ExtractorError;
use finscribe_domain::TransactionRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix appended to the output path to name the checkpoint file
pub const CHECKPOINT_SUFFIX: &str = ".checkpoint";

/// One committed batch, as recorded in the checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedBatch {
    /// Zero-based batch index
    pub index: usize,
    /// Identifiers of the batch's source files, in order
    pub files: Vec<String>,
    /// Number of records the batch contributed
    pub records: usize,
    /// True if the batch failed and was skipped by policy
    #[serde(default)]
    pub skipped: bool,
}

/// Progress marker persisted next to the result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identifier of the run that started this result set
    pub run_id: String,
    /// Batch size the committed batches were produced with
    pub batch_size: usize,
    /// Committed batches, in index order
    pub batches: Vec<CommittedBatch>,
}

impl Checkpoint {
    fn new() -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            batch_size: 0,
            batches: Vec::new(),
        }
    }

    /// Total records across committed batches
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records).sum()
    }

    /// Index of the next batch to commit
    pub fn next_index(&self) -> usize {
        self.batches.len()
    }

    /// Batches that were skipped after a terminal failure
    pub fn skipped(&self) -> impl Iterator<Item = &CommittedBatch> {
        self.batches.iter().filter(|b| b.skipped)
    }
}

/// A batch's outcome, handed to a [`ResultSink`] for commit
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommit {
    /// Zero-based batch index
    pub index: usize,
    /// Batch size of the run
    pub batch_size: usize,
    /// Identifiers of the batch's source files
    pub files: Vec<String>,
    /// Validated records, in service order
    pub records: Vec<TransactionRecord>,
    /// True if the batch is committed empty after a terminal failure
    pub skipped: bool,
}

/// Destination for committed batches.
///
/// The pipeline only talks to the result set through this trait, so tests can
/// observe every commit.
pub trait ResultSink {
    /// Batches committed so far, in index order
    fn committed(&self) -> &[CommittedBatch];

    /// Batch size recorded by earlier commits, if any
    fn batch_size(&self) -> Option<usize>;

    /// Append one batch and make it durable before returning
    fn append(&mut self, commit: BatchCommit) -> Result<(), ExtractorError>;
}

/// File-backed [`ResultSink`] with atomic replace-on-write.
///
/// Not safe for concurrent runs against the same output path.
#[derive(Debug)]
pub struct ResultAccumulator {
    path: PathBuf,
    checkpoint_path: PathBuf,
    records: Vec<TransactionRecord>,
    checkpoint: Checkpoint,
}

impl ResultAccumulator {
    /// Path of the checkpoint kept next to `path`
    pub fn checkpoint_path_for(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(CHECKPOINT_SUFFIX);
        PathBuf::from(name)
    }

    /// Load the last persisted state at `path`, or start empty if nothing is there.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the files are inconsistent in a way
    /// that cannot be repaired without guessing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtractorError> {
        let path = path.as_ref().to_path_buf();
        let checkpoint_path = Self::checkpoint_path_for(&path);

        let checkpoint = match read_optional(&checkpoint_path)? {
            Some(text) => serde_json::from_str::<Checkpoint>(&text).map_err(|e| {
                ExtractorError::Config(format!(
                    "checkpoint {} is corrupt: {}",
                    checkpoint_path.display(),
                    e
                ))
            })?,
            None => {
                if path.exists() {
                    return Err(ExtractorError::Config(format!(
                        "{} exists without a checkpoint; use a fresh run or another output path",
                        path.display()
                    )));
                }
                debug!("No previous results at {}", path.display());
                return Ok(Self {
                    path,
                    checkpoint_path,
                    records: Vec::new(),
                    checkpoint: Checkpoint::new(),
                });
            }
        };

        for (expected, batch) in checkpoint.batches.iter().enumerate() {
            if batch.index != expected {
                return Err(ExtractorError::Config(format!(
                    "checkpoint {} lists batch {} where batch {} was expected",
                    checkpoint_path.display(),
                    batch.index,
                    expected
                )));
            }
        }

        let mut records: Vec<TransactionRecord> = match read_optional(&path)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                ExtractorError::Config(format!(
                    "{} is not a JSON array of records: {}",
                    path.display(),
                    e
                ))
            })?,
            None => Vec::new(),
        };

        let committed = checkpoint.record_count();
        if committed > records.len() {
            return Err(ExtractorError::Config(format!(
                "checkpoint {} claims {} records but {} holds {}",
                checkpoint_path.display(),
                committed,
                path.display(),
                records.len()
            )));
        }
        if committed < records.len() {
            // Interrupted between the records write and the checkpoint write
            warn!(
                "Dropping {} uncommitted record(s) from {}",
                records.len() - committed,
                path.display()
            );
            records.truncate(committed);
        }

        info!(
            "Loaded {} record(s) from {} committed batch(es) in {}",
            records.len(),
            checkpoint.batches.len(),
            path.display()
        );

        Ok(Self {
            path,
            checkpoint_path,
            records,
            checkpoint,
        })
    }

    /// Start a new, empty result set at `path`, discarding previous results
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ExtractorError> {
        let path = path.as_ref().to_path_buf();
        let checkpoint_path = Self::checkpoint_path_for(&path);

        // Checkpoint first: a records file without one is refused on load
        remove_if_exists(&checkpoint_path)?;
        remove_if_exists(&path)?;

        Ok(Self {
            path,
            checkpoint_path,
            records: Vec::new(),
            checkpoint: Checkpoint::new(),
        })
    }

    /// Output path of the record array
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the checkpoint file
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Records committed so far, in commit order
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Consume the accumulator and return its records
    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }

    /// Current checkpoint
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Identifier of the run that started this result set
    pub fn run_id(&self) -> &str {
        &self.checkpoint.run_id
    }

    fn persist_state(&self, records: &[TransactionRecord], checkpoint: &Checkpoint) -> Result<(), ExtractorError> {
        let records_json = serde_json::to_vec_pretty(records)
            .map_err(|e| ExtractorError::Persistence(format!("Failed to encode records: {}", e)))?;
        let checkpoint_json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| ExtractorError::Persistence(format!("Failed to encode checkpoint: {}", e)))?;

        write_atomic(&self.path, &records_json)?;
        write_atomic(&self.checkpoint_path, &checkpoint_json)
    }
}

impl ResultSink for ResultAccumulator {
    fn committed(&self) -> &[CommittedBatch] {
        &self.checkpoint.batches
    }

    fn batch_size(&self) -> Option<usize> {
        if self.checkpoint.batches.is_empty() {
            None
        } else {
            Some(self.checkpoint.batch_size)
        }
    }

    fn append(&mut self, commit: BatchCommit) -> Result<(), ExtractorError> {
        let expected = self.checkpoint.next_index();
        if commit.index != expected {
            return Err(ExtractorError::Persistence(format!(
                "refusing to commit batch {}: next batch is {}",
                commit.index, expected
            )));
        }
        if let Some(batch_size) = self.batch_size() {
            if batch_size != commit.batch_size {
                return Err(ExtractorError::Config(format!(
                    "batch size {} does not match the committed batch size {}",
                    commit.batch_size, batch_size
                )));
            }
        }

        let appended = commit.records.len();
        let mut checkpoint = self.checkpoint.clone();
        checkpoint.batch_size = commit.batch_size;
        checkpoint.batches.push(CommittedBatch {
            index: commit.index,
            files: commit.files,
            records: appended,
            skipped: commit.skipped,
        });

        let previous_len = self.records.len();
        self.records.extend(commit.records);
        if let Err(e) = self.persist_state(&self.records, &checkpoint) {
            self.records.truncate(previous_len);
            return Err(e);
        }
        self.checkpoint = checkpoint;

        info!(
            "Committed batch {}: {} record(s) appended, {} total",
            commit.index,
            appended,
            self.records.len()
        );
        Ok(())
    }
}

/// Write `bytes` to a temp file in the target's directory, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractorError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| {
        ExtractorError::Persistence(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    sync_dir(dir)
}

/// Flush a directory entry so a completed rename survives power loss
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), ExtractorError> {
    std::fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| {
            ExtractorError::Persistence(format!("Failed to sync {}: {}", dir.display(), e))
        })
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), ExtractorError> {
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, ExtractorError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ExtractorError::Persistence(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), ExtractorError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExtractorError::Persistence(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
