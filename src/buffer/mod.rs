//! Event Buffer Module
//!
//! Durable local storage for the collection phase:
//! - `EventBuffer`: append-only record log plus the run manifest
//! - `BufferStats`: counts and sizes reported before export
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//! ├── buffer.jsonl   one BufferedRecord per line, fsync'd per append
//! ├── run.json       window + partition labels of the current run
//! └── <artifact>     batch file written by the exporter
//! ```

mod stats;
mod store;

pub use stats::BufferStats;
pub use store::{BufferConfig, BufferError, BufferResult, EventBuffer};
