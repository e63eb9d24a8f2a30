//! Stream Harvest
//!
//! Scheduled collection of a filtered social-media event stream into
//! newline-delimited batch files, ready for compression and upload.
//!
//! # Pipeline
//!
//! - **Collection**: the stream driver feeds each event to the window
//!   controller, which decides whether it is appended to the durable buffer,
//!   ignored, or ends the run.
//! - **Export**: the buffer is deduplicated by identity key, every embedded
//!   timestamp is rewritten to a sortable form, and the result is written in
//!   key order to the handoff artifact.
//!
//! # Modules
//!
//! - `types`: Core data structures (RawEvent, BufferedRecord, CollectionWindow)
//! - `window`: Window controller and daily schedule
//! - `buffer`: Append-only event buffer and its statistics
//! - `dedup`: First-received-wins deduplication
//! - `normalize`: Timestamp normalizer
//! - `export`: Batch exporter
//! - `driver`: Resilient stream driver and event sources
//! - `collector`: One collection run end to end
//! - `config`: Collector configuration
//! - `utils`: Time formats and atomic file writes
//!
//! # Example
//!
//! ```no_run
//! use stream_harvest::{Collector, CollectorConfig, LineSource};
//!
//! #[tokio::main]
//! async fn main() -> stream_harvest::AppResult<()> {
//!     let config = CollectorConfig::from_file("harvest.json")?.with_env_overrides();
//!     let report = Collector::new(config)
//!         .collect(LineSource::file("stream.jsonl"), false)
//!         .await?;
//!     println!("{} records exported", report.export.records_written);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod export;
pub mod normalize;
pub mod types;
pub mod utils;
pub mod window;

// Re-export commonly used items at crate root
pub use buffer::{BufferConfig, BufferStats, EventBuffer};
pub use collector::{CollectError, CollectReport, Collector};
pub use config::{CollectorConfig, ConfigError};
pub use dedup::{dedupe, DeduplicatedSet};
pub use driver::{DriverOutcome, EventSource, LineSource, StreamDriver, StreamError};
pub use export::{BatchExporter, ExportSummary};
pub use normalize::Normalizer;
pub use types::{
    AppResult, BufferedRecord, CollectionWindow, EventFields, PartitionLabels, RawEvent,
    RunManifest, StreamFilter,
};
pub use window::{Decision, WindowController, WindowSchedule};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
