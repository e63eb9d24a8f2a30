//! Event Buffer - durable append-only record log
//!
//! Every accepted event is appended to `buffer.jsonl` and synced to disk
//! before `append` returns, so a process killed right after an append never
//! loses that record. Scans always re-read the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{BufferedRecord, RunManifest};
use crate::utils::atomic_write;

/// Configuration for the EventBuffer
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Path to the data directory
    pub data_dir: PathBuf,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tmp"),
        }
    }
}

impl BufferConfig {
    /// Create config with custom data directory
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get path to buffer.jsonl
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("buffer.jsonl")
    }

    /// Get path to the run manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("run.json")
    }
}

/// Result type for EventBuffer operations
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur in EventBuffer operations
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("buffer JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("buffer corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },
}

/// The EventBuffer owns the append-only record log of one collection run
pub struct EventBuffer {
    config: BufferConfig,
    /// Append handle on buffer.jsonl
    file: File,
    /// Sequence number the next append receives
    next_sequence_no: u64,
}

impl EventBuffer {
    /// Open the buffer, creating it if needed
    ///
    /// An existing buffer is resumed: numbering continues after the highest
    /// persisted sequence number. A torn trailing line left by a crash
    /// mid-write is truncated away first.
    pub fn open(config: BufferConfig) -> BufferResult<Self> {
        fs::create_dir_all(config.data_dir())?;
        let path = config.records_path();

        let (valid_len, last_sequence_no) = if path.exists() {
            Self::recover(&path)?
        } else {
            (0, 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let actual_len = file.metadata()?.len();
        if actual_len > valid_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = actual_len - valid_len,
                "truncating torn trailing record"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        if last_sequence_no > 0 {
            tracing::info!(
                path = %path.display(),
                last_sequence_no,
                "resuming existing buffer"
            );
        }

        Ok(Self {
            config,
            file,
            next_sequence_no: last_sequence_no + 1,
        })
    }

    /// Find the length of the fully-terminated prefix and its last sequence number
    fn recover(path: &Path) -> BufferResult<(u64, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = Vec::new();
        let mut valid_len = 0u64;
        let mut last_sequence_no = 0u64;
        let mut line_no = 0usize;

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }
            line_no += 1;
            valid_len += read as u64;

            if let Some(record) = Self::parse_line(&line, line_no)? {
                last_sequence_no = last_sequence_no.max(record.sequence_no);
            }
        }

        Ok((valid_len, last_sequence_no))
    }

    fn parse_line(line: &[u8], line_no: usize) -> BufferResult<Option<BufferedRecord>> {
        let text = std::str::from_utf8(line).map_err(|e| BufferError::Corrupted {
            line: line_no,
            reason: e.to_string(),
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        BufferedRecord::from_json_line(text)
            .map(Some)
            .map_err(|e| BufferError::Corrupted {
                line: line_no,
                reason: e.to_string(),
            })
    }

    /// Get the configuration
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Sequence number the next append will receive
    pub fn next_sequence_no(&self) -> u64 {
        self.next_sequence_no
    }

    /// Whether nothing has been appended since creation or the last reset
    pub fn is_empty(&self) -> bool {
        self.next_sequence_no == 1
    }

    /// Append an accepted event
    ///
    /// The record is written with a single write and synced before
    /// returning. Any error here is fatal for the run.
    pub fn append(&mut self, identity_key: &str, serialized_form: &str) -> BufferResult<u64> {
        let sequence_no = self.next_sequence_no;
        let record = BufferedRecord::new(
            sequence_no,
            identity_key.to_string(),
            serialized_form.to_string(),
        );

        let mut line = record.to_json_line()?;
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;

        self.next_sequence_no += 1;
        Ok(sequence_no)
    }

    /// Read every persisted record in ascending sequence order
    ///
    /// An unterminated final line (an append interrupted by a crash in
    /// another process) is skipped.
    pub fn scan(&self) -> BufferResult<Vec<BufferedRecord>> {
        let path = self.config.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        let mut line = Vec::new();
        let mut line_no = 0usize;
        let mut previous = 0u64;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;

            if line.last() != Some(&b'\n') {
                tracing::warn!(line = line_no, "skipping unterminated trailing record");
                break;
            }

            if let Some(record) = Self::parse_line(&line, line_no)? {
                if record.sequence_no <= previous {
                    return Err(BufferError::Corrupted {
                        line: line_no,
                        reason: format!(
                            "sequence number {} does not follow {}",
                            record.sequence_no, previous
                        ),
                    });
                }
                previous = record.sequence_no;
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Discard all records and the run manifest
    pub fn reset(&mut self) -> BufferResult<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.next_sequence_no = 1;

        let manifest_path = self.config.manifest_path();
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }

        tracing::info!(path = %self.config.records_path().display(), "buffer reset");
        Ok(())
    }

    /// Persist the run manifest (window and partition labels)
    pub fn write_manifest(&self, manifest: &RunManifest) -> BufferResult<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        atomic_write(self.config.manifest_path(), &json)?;
        Ok(())
    }

    /// Load the run manifest, if one was written
    pub fn read_manifest(&self) -> BufferResult<Option<RunManifest>> {
        let path = self.config.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
