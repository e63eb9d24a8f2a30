//! Buffer statistics
//!
//! Summarises a buffer before export: how much was collected and how much
//! of it the deduplicator is about to discard.

use std::collections::HashSet;
use std::fs;

use super::store::{BufferResult, EventBuffer};
use crate::types::BufferedRecord;

/// Statistics about the Event Buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records persisted, duplicates included
    pub record_count: usize,
    /// Distinct identity keys
    pub distinct_keys: usize,
    /// Highest sequence number persisted (0 when empty)
    pub last_sequence_no: u64,
    /// Size of buffer.jsonl in bytes
    pub file_size: u64,
}

impl BufferStats {
    /// Records that share a key with an earlier record
    pub fn duplicate_count(&self) -> usize {
        self.record_count - self.distinct_keys
    }

    /// Compute statistics over already-scanned records
    pub fn from_records(records: &[BufferedRecord], file_size: u64) -> Self {
        let distinct_keys = records
            .iter()
            .map(|r| r.identity_key.as_str())
            .collect::<HashSet<_>>()
            .len();

        Self {
            record_count: records.len(),
            distinct_keys,
            last_sequence_no: records.iter().map(|r| r.sequence_no).max().unwrap_or(0),
            file_size,
        }
    }

    /// Scan the buffer, returning its records with their statistics
    pub fn collect(buffer: &EventBuffer) -> BufferResult<(Self, Vec<BufferedRecord>)> {
        let records = buffer.scan()?;
        let path = buffer.config().records_path();
        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };
        Ok((Self::from_records(&records, file_size), records))
    }

    /// Format size in human-readable format
    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}
