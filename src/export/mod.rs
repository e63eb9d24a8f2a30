//! Batch Exporter
//!
//! Drains a buffer into the handoff artifact consumed by the compression
//! and upload stage: dedupe, normalize each survivor, write one record per
//! line in ascending key order. The artifact is written atomically and its
//! content depends only on the buffer, so re-running an export over the same
//! buffer produces the same bytes.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::buffer::{BufferError, BufferStats, EventBuffer};
use crate::dedup::{dedupe, DeduplicatedSet};
use crate::normalize::{NormalizeError, Normalizer};
use crate::types::PartitionLabels;
use crate::utils::{atomic_write_with, cleanup_temp_files};

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot normalize record {identity_key} (sequence {sequence_no}): {source}")]
    Normalize {
        identity_key: String,
        sequence_no: u64,
        #[source]
        source: NormalizeError,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub artifact_path: PathBuf,
    pub records_written: usize,
    pub duplicates_discarded: usize,
    /// Labels for the upload stage, when the run recorded them
    pub labels: Option<PartitionLabels>,
}

/// Writes deduplicated sets to the handoff artifact
#[derive(Debug, Clone)]
pub struct BatchExporter {
    normalizer: Normalizer,
    artifact_path: PathBuf,
}

impl BatchExporter {
    pub fn new(normalizer: Normalizer, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            normalizer,
            artifact_path: artifact_path.into(),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Write the artifact for an already deduplicated set
    ///
    /// Nothing is written if any record fails to normalize; a previous
    /// artifact stays in place.
    pub fn export(&self, set: &DeduplicatedSet) -> ExportResult<ExportSummary> {
        let mut failure: Option<ExportError> = None;

        let written = atomic_write_with(&self.artifact_path, |file| {
            let mut writer = BufWriter::new(file);
            for entry in set.iter() {
                let line = match self.normalizer.normalize(&entry.serialized_form) {
                    Ok(line) => line,
                    Err(source) => {
                        failure = Some(ExportError::Normalize {
                            identity_key: entry.identity_key.clone(),
                            sequence_no: entry.sequence_no,
                            source,
                        });
                        return Err(io::Error::other("record normalization failed"));
                    }
                };
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()
        });

        if let Some(err) = failure {
            return Err(err);
        }
        written.map_err(|source| ExportError::Io {
            path: self.artifact_path.clone(),
            source,
        })?;

        Ok(ExportSummary {
            artifact_path: self.artifact_path.clone(),
            records_written: set.len(),
            duplicates_discarded: set.discarded(),
            labels: None,
        })
    }

    /// Scan, dedupe and export a buffer
    pub fn export_buffer(&self, buffer: &EventBuffer) -> ExportResult<ExportSummary> {
        let data_dir = buffer.config().data_dir();
        match cleanup_temp_files(data_dir) {
            Ok(0) => {}
            Ok(cleaned) => info!(cleaned, "removed leftover temp files"),
            Err(e) => warn!(error = %e, "failed to clean up temp files"),
        }

        let (stats, records) = BufferStats::collect(buffer)?;
        info!(
            records = stats.record_count,
            distinct = stats.distinct_keys,
            duplicates = stats.duplicate_count(),
            size = %BufferStats::format_size(stats.file_size),
            "exporting buffer"
        );

        let set = dedupe(records);
        let mut summary = self.export(&set)?;
        summary.labels = buffer.read_manifest()?.map(|m| m.labels);

        info!(
            path = %summary.artifact_path.display(),
            records = summary.records_written,
            discarded = summary.duplicates_discarded,
            "export complete"
        );
        Ok(summary)
    }
}
