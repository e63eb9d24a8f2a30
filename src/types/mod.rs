//! Data types for the stream collector
//!
//! This module contains the core data structures shared by the collection
//! and export phases.

mod event;
mod filter;
mod window;

pub use event::{BufferedRecord, EventFields, RawEvent};
pub use filter::StreamFilter;
pub use window::{CollectionWindow, PartitionLabels, RunManifest, WindowError};

/// Result type for the binary's top-level operations
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
