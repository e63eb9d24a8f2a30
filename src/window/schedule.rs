//! Daily schedule from which each run's collection window is computed

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::types::{CollectionWindow, WindowError};

/// Daily UTC start time plus saving and grace durations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSchedule {
    /// Time of day (UTC) saving starts, `HH:MM:SS`
    pub start_time: NaiveTime,
    /// Length of the saving interval in seconds
    pub saving_duration_secs: u64,
    /// Grace period after saving ends before the run stops, in seconds
    pub end_delay_secs: u64,
}

impl Default for WindowSchedule {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(18, 53, 0).unwrap_or_default(),
            saving_duration_secs: 60,
            end_delay_secs: 30,
        }
    }
}

fn seconds(secs: u64) -> Result<TimeDelta, WindowError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(WindowError::DurationOutOfRange(secs))
}

impl WindowSchedule {
    /// Compute the window for a run started at `now`
    ///
    /// Saving starts at today's `start_time`, or tomorrow's if that is not
    /// strictly in the future.
    pub fn window_at(&self, now: NaiveDateTime) -> Result<CollectionWindow, WindowError> {
        let mut start_saving = now.date().and_time(self.start_time);
        if start_saving <= now {
            start_saving = start_saving
                .checked_add_signed(TimeDelta::days(1))
                .ok_or(WindowError::DurationOutOfRange(86_400))?;
        }

        let end_saving = start_saving
            .checked_add_signed(seconds(self.saving_duration_secs)?)
            .ok_or(WindowError::DurationOutOfRange(self.saving_duration_secs))?;
        let end_execution = end_saving
            .checked_add_signed(seconds(self.end_delay_secs)?)
            .ok_or(WindowError::DurationOutOfRange(self.end_delay_secs))?;

        CollectionWindow::new(start_saving, end_saving, end_execution)
    }
}
