//! Utility functions and helpers
//!
//! Timestamp formats and atomic file writes shared across the pipeline.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files};
pub use time::{
    format_canonical, format_partition_date, parse_source_timestamp, utc_now, CANONICAL_FORMAT,
    SOURCE_FORMAT,
};
