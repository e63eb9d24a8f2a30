//! Collection window and partition labels

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::format_partition_date;

/// Errors raised while building a collection window
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("duration of {0} seconds is out of range")]
    DurationOutOfRange(u64),
    #[error("window bounds out of order: start {start}, end saving {end_saving}, end execution {end_execution}")]
    Unordered {
        start: NaiveDateTime,
        end_saving: NaiveDateTime,
        end_execution: NaiveDateTime,
    },
}

/// The fixed time frame of one collection run
///
/// Events timed within `[start_saving, end_saving)` are buffered; the first
/// eligible event timed at or after `end_execution` ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    start_saving: NaiveDateTime,
    end_saving: NaiveDateTime,
    end_execution: NaiveDateTime,
}

impl CollectionWindow {
    pub fn new(
        start_saving: NaiveDateTime,
        end_saving: NaiveDateTime,
        end_execution: NaiveDateTime,
    ) -> Result<Self, WindowError> {
        if start_saving > end_saving || end_saving > end_execution {
            return Err(WindowError::Unordered {
                start: start_saving,
                end_saving,
                end_execution,
            });
        }

        Ok(Self {
            start_saving,
            end_saving,
            end_execution,
        })
    }

    pub fn start_saving(&self) -> NaiveDateTime {
        self.start_saving
    }

    pub fn end_saving(&self) -> NaiveDateTime {
        self.end_saving
    }

    pub fn end_execution(&self) -> NaiveDateTime {
        self.end_execution
    }

    /// Whether `time` falls in the half-open saving interval
    pub fn is_saving(&self, time: NaiveDateTime) -> bool {
        self.start_saving <= time && time < self.end_saving
    }
}

/// Labels handed to the upload stage for storage path construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLabels {
    pub filter_name: String,
    pub creation_date: String,
}

impl PartitionLabels {
    /// Labels for a run, dated by the window start
    pub fn for_window(filter_name: &str, window: &CollectionWindow) -> Self {
        Self {
            filter_name: filter_name.to_string(),
            creation_date: format_partition_date(&window.start_saving()),
        }
    }
}

/// What a run persists next to its buffer so a restarted process resumes
/// the same window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub window: CollectionWindow,
    pub labels: PartitionLabels,
    /// Set once the buffer has been exported to the handoff artifact
    #[serde(default)]
    pub exported: bool,
}

impl RunManifest {
    pub fn new(filter_name: &str, window: CollectionWindow) -> Self {
        Self {
            labels: PartitionLabels::for_window(filter_name, &window),
            window,
            exported: false,
        }
    }
}
