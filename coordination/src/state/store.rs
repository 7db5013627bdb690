//! Checkpoint store contract and its two backends.
//!
//! - [`MemoryCheckpointStore`]: in-process, for tests and one-shot runs.
//! - [`JsonlCheckpointStore`]: one append-only `<run_id>.jsonl` file per run.
//!
//! Both enforce the gap-free sequence rule on append, so a caller bug that
//! skips or repeats a sequence number is caught at the storage boundary.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::checkpoint::Checkpoint;
use super::schema::files;

/// Error type for checkpoint store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("run {run_id}: expected sequence {expected}, got {found}")]
    SequenceGap {
        run_id: String,
        expected: u64,
        found: u64,
    },

    #[error("checkpoint for run {found} appended under run {expected}")]
    RunMismatch { expected: String, found: String },

    #[error("checkpoint version {found} is newer than supported {supported}")]
    VersionMismatch { supported: u32, found: u32 },

    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for checkpoint store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle passed to the orchestrator.
pub type SharedCheckpointStore = Arc<dyn CheckpointStore>;

/// Append-only checkpoint log keyed by run id.
///
/// A read issued after a successful `append` observes that append.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `checkpoint` and return its sequence number.
    ///
    /// Rejects anything other than `last + 1` (or `1` for a new run).
    async fn append(&self, run_id: &str, checkpoint: &Checkpoint) -> StoreResult<u64>;

    /// Highest-sequence checkpoint of the run, if the run exists.
    async fn load_latest(&self, run_id: &str) -> StoreResult<Option<Checkpoint>>;

    /// All checkpoints of the run in sequence order.
    async fn history(&self, run_id: &str) -> StoreResult<Vec<Checkpoint>>;

    /// Ids of every run the store knows about, sorted.
    async fn list_runs(&self) -> StoreResult<Vec<String>>;
}

fn check_append(run_id: &str, last: u64, checkpoint: &Checkpoint) -> StoreResult<()> {
    if checkpoint.run_id != run_id {
        return Err(StoreError::RunMismatch {
            expected: run_id.to_string(),
            found: checkpoint.run_id.clone(),
        });
    }
    if checkpoint.version > Checkpoint::CURRENT_VERSION {
        return Err(StoreError::VersionMismatch {
            supported: Checkpoint::CURRENT_VERSION,
            found: checkpoint.version,
        });
    }
    let expected = last + 1;
    if checkpoint.sequence != expected {
        return Err(StoreError::SequenceGap {
            run_id: run_id.to_string(),
            expected,
            found: checkpoint.sequence,
        });
    }
    Ok(())
}

fn check_version(checkpoint: Checkpoint) -> StoreResult<Checkpoint> {
    if checkpoint.version > Checkpoint::CURRENT_VERSION {
        return Err(StoreError::VersionMismatch {
            supported: Checkpoint::CURRENT_VERSION,
            found: checkpoint.version,
        });
    }
    Ok(checkpoint)
}

// =========================================================================
// In-memory backend
// =========================================================================

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    runs: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedCheckpointStore {
        Arc::new(self)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn append(&self, run_id: &str, checkpoint: &Checkpoint) -> StoreResult<u64> {
        let mut runs = self.runs.write().await;
        let log = runs.entry(run_id.to_string()).or_default();
        let last = log.last().map(|c| c.sequence).unwrap_or(0);
        check_append(run_id, last, checkpoint)?;
        log.push(checkpoint.clone());
        Ok(checkpoint.sequence)
    }

    async fn load_latest(&self, run_id: &str) -> StoreResult<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|log| log.last().cloned()))
    }

    async fn history(&self, run_id: &str) -> StoreResult<Vec<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned().unwrap_or_default())
    }

    async fn list_runs(&self) -> StoreResult<Vec<String>> {
        let runs = self.runs.read().await;
        let mut ids: Vec<String> = runs
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// =========================================================================
// JSONL file backend
// =========================================================================

/// One `<run_id>.jsonl` file per run; one JSON checkpoint per line.
///
/// Every append is `sync_data`'d before returning. Lines that fail to parse
/// (a torn final write after a crash) are skipped with a warning, and the
/// next append starts on a fresh line.
#[derive(Debug)]
pub struct JsonlCheckpointStore {
    dir: PathBuf,
    /// Last persisted sequence per run, loaded from disk on first append.
    last_sequences: Mutex<HashMap<String, u64>>,
}

impl JsonlCheckpointStore {
    /// Open or create a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;
        Ok(Self {
            dir,
            last_sequences: Mutex::new(HashMap::new()),
        })
    }

    pub fn shared(self) -> SharedCheckpointStore {
        Arc::new(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, run_id: &str) -> StoreResult<PathBuf> {
        if !files::is_valid_run_id(run_id) {
            return Err(StoreError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.dir.join(files::checkpoint_log(run_id)))
    }

    async fn read_log(&self, path: &Path) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(path, source)),
        }
    }

    fn parse_lines(path: &Path, content: &str) -> StoreResult<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Checkpoint>(line) {
                Ok(cp) => checkpoints.push(check_version(cp)?),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = idx + 1,
                        error = %e,
                        "Skipping unparseable checkpoint line"
                    );
                }
            }
        }
        Ok(checkpoints)
    }

    async fn load_last_sequence(&self, path: &Path) -> StoreResult<u64> {
        let Some(content) = self.read_log(path).await? else {
            return Ok(0);
        };
        Ok(Self::parse_lines(path, &content)?
            .last()
            .map(|c| c.sequence)
            .unwrap_or(0))
    }
}

/// Append `json` as one line, first terminating any partial line the file
/// ends with.
async fn append_line(path: &Path, json: &str) -> StoreResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| io_error(path, source))?;
    let len = file
        .metadata()
        .await
        .map_err(|source| io_error(path, source))?
        .len();
    let mut last = [b'\n'];
    if len > 0 {
        file.seek(SeekFrom::End(-1))
            .await
            .map_err(|source| io_error(path, source))?;
        file.read_exact(&mut last)
            .await
            .map_err(|source| io_error(path, source))?;
    }

    let mut line = String::with_capacity(json.len() + 2);
    if last[0] != b'\n' {
        line.push('\n');
    }
    line.push_str(json);
    line.push('\n');
    file.write_all(line.as_bytes())
        .await
        .map_err(|source| io_error(path, source))?;
    file.sync_data()
        .await
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl CheckpointStore for JsonlCheckpointStore {
    async fn append(&self, run_id: &str, checkpoint: &Checkpoint) -> StoreResult<u64> {
        let path = self.log_path(run_id)?;
        let mut last_sequences = self.last_sequences.lock().await;
        let last = match last_sequences.get(run_id) {
            Some(last) => *last,
            None => self.load_last_sequence(&path).await?,
        };
        check_append(run_id, last, checkpoint)?;

        let json = serde_json::to_string(checkpoint)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Err(e) = append_line(&path, &json).await {
            // A failed write may have landed partially; reload from disk next time.
            last_sequences.remove(run_id);
            return Err(e);
        }

        last_sequences.insert(run_id.to_string(), checkpoint.sequence);
        debug!(run_id, sequence = checkpoint.sequence, "Checkpoint appended");
        Ok(checkpoint.sequence)
    }

    async fn load_latest(&self, run_id: &str) -> StoreResult<Option<Checkpoint>> {
        Ok(self.history(run_id).await?.pop())
    }

    async fn history(&self, run_id: &str) -> StoreResult<Vec<Checkpoint>> {
        let path = self.log_path(run_id)?;
        match self.read_log(&path).await? {
            Some(content) => Self::parse_lines(&path, &content),
            None => Ok(Vec::new()),
        }
    }

    async fn list_runs(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.dir, source))?
        {
            if let Some(id) = entry.file_name().to_str().and_then(files::parse_run_id) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
