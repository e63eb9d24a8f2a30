//! Collector - one scheduled collection run end to end
//!
//! Computes (or resumes) the window, streams into the buffer until the
//! driver finishes, then exports the buffer to the handoff artifact.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::buffer::{BufferError, EventBuffer};
use crate::config::CollectorConfig;
use crate::driver::{DriverError, EventSource, RunSummary, StreamDriver};
use crate::export::{BatchExporter, ExportError, ExportSummary};
use crate::normalize::Normalizer;
use crate::types::{CollectionWindow, RunManifest, WindowError};
use crate::utils::utc_now;
use crate::window::WindowController;

/// Result type for collector operations
pub type CollectResult<T> = Result<T, CollectError>;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("buffer holds {records} unexported records from a finished run; export it or rerun with --fresh")]
    StaleBuffer {
        records: u64,
        /// End of the recorded window, if the run left a manifest
        ended: Option<NaiveDateTime>,
    },
}

/// Outcome of a full collection run
#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub manifest: RunManifest,
    /// Whether an interrupted run's window was picked up again
    pub resumed: bool,
    pub run: RunSummary,
    pub export: ExportSummary,
}

pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Window a run started at `now` would use
    pub fn window(&self, now: NaiveDateTime) -> CollectResult<CollectionWindow> {
        Ok(self.config.schedule.window_at(now)?)
    }

    fn exporter(&self) -> BatchExporter {
        BatchExporter::new(
            Normalizer::new(self.config.fields.event_time.clone()),
            self.config.artifact_path(),
        )
    }

    /// Pick the manifest for a run starting at `now`
    ///
    /// A recorded window that has not reached `end_execution` is resumed.
    /// A finished window whose buffer was exported is cleared for the new
    /// run; one with unexported records is refused, so a batch is never
    /// mixed into the next one.
    fn prepare(
        &self,
        buffer: &mut EventBuffer,
        now: NaiveDateTime,
    ) -> CollectResult<(RunManifest, bool)> {
        match buffer.read_manifest()? {
            Some(manifest) if now < manifest.window.end_execution() => {
                info!(
                    start = %manifest.window.start_saving(),
                    end_execution = %manifest.window.end_execution(),
                    buffered = buffer.next_sequence_no() - 1,
                    "resuming collection window"
                );
                return Ok((manifest, true));
            }
            Some(manifest) if manifest.exported => buffer.reset()?,
            Some(manifest) if !buffer.is_empty() => {
                return Err(CollectError::StaleBuffer {
                    records: buffer.next_sequence_no() - 1,
                    ended: Some(manifest.window.end_execution()),
                });
            }
            None if !buffer.is_empty() => {
                return Err(CollectError::StaleBuffer {
                    records: buffer.next_sequence_no() - 1,
                    ended: None,
                });
            }
            _ => {}
        }

        let window = self.window(now)?;
        let manifest = RunManifest::new(&self.config.filter.name, window);
        buffer.write_manifest(&manifest)?;
        info!(
            filter = %manifest.labels.filter_name,
            start = %window.start_saving(),
            end_saving = %window.end_saving(),
            end_execution = %window.end_execution(),
            "collection window computed"
        );
        Ok((manifest, false))
    }

    /// Export the buffer and flag the manifest as exported
    fn export_and_mark(&self, buffer: &EventBuffer) -> CollectResult<ExportSummary> {
        let summary = self.exporter().export_buffer(buffer)?;
        if let Some(mut manifest) = buffer.read_manifest()? {
            manifest.exported = true;
            buffer.write_manifest(&manifest)?;
        }
        Ok(summary)
    }

    /// Collect from `source` and export, with `now` as the run start
    pub async fn collect_at<S: EventSource>(
        &self,
        source: S,
        fresh: bool,
        now: NaiveDateTime,
    ) -> CollectResult<CollectReport> {
        let mut buffer = EventBuffer::open(self.config.buffer_config())?;
        if fresh {
            buffer.reset()?;
        }

        let (manifest, resumed) = self.prepare(&mut buffer, now)?;

        let mut driver = StreamDriver::new(
            source,
            WindowController::new(manifest.window),
            self.config.fields.clone(),
            self.config.driver.clone(),
        );
        let run = driver.run(&self.config.filter, &mut buffer).await?;

        let export = self.export_and_mark(&buffer)?;

        Ok(CollectReport {
            manifest,
            resumed,
            run,
            export,
        })
    }

    /// Collect from `source` and export, starting now
    pub async fn collect<S: EventSource>(&self, source: S, fresh: bool) -> CollectResult<CollectReport> {
        self.collect_at(source, fresh, utc_now()).await
    }

    /// Export the existing buffer without collecting
    pub fn export(&self) -> CollectResult<ExportSummary> {
        let buffer = EventBuffer::open(self.config.buffer_config())?;
        self.export_and_mark(&buffer)
    }
}
