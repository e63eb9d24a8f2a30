//! Resilient Stream Driver
//!
//! Supervises the upstream connection for one collection run:
//!
//! ```text
//! Connecting -> Streaming -> Reconnecting -> Connecting ...
//!                   |              |
//!                   v              v
//!              Terminated    Terminated (retries exhausted)
//! ```
//!
//! Every connect or stream failure bumps a failure counter; every accepted
//! event resets it. Once the counter exceeds the bound the last error is
//! propagated. A STOP decision, or the source running dry, ends the run
//! cleanly without touching the counter.

mod source;

pub use source::{EventSource, EventStream, LineSource, StreamError};

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferError, EventBuffer};
use crate::types::{EventFields, RawEvent, StreamFilter};
use crate::window::{Decision, WindowController};

/// Retry policy of the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Failures tolerated without an intervening accept
    pub max_failures: u32,
    /// Fixed pause before each reconnect, in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_failures: 10,
            reconnect_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Connecting,
    Streaming,
    Reconnecting,
    Terminated,
}

/// How a run that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverOutcome {
    /// The window controller returned STOP
    Stopped,
    /// The source ended its stream
    Exhausted,
}

/// Result type for the stream driver
pub type DriverResult<T> = Result<T, DriverError>;

/// Fatal driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("giving up after {failures} consecutive failures (limit {limit}): {last_error}")]
    RetriesExhausted {
        failures: u32,
        limit: u32,
        #[source]
        last_error: StreamError,
    },
    #[error("failed to buffer event {identity_key}: {source}")]
    Buffer {
        identity_key: String,
        #[source]
        source: BufferError,
    },
}

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub outcome: Option<DriverOutcome>,
    pub accepted: u64,
    pub ignored: u64,
    /// Lines that were not JSON documents
    pub unparseable: u64,
    pub reconnects: u32,
    /// Sequence number of the last accepted event
    pub last_sequence_no: Option<u64>,
}

/// Failure transition: the next counter value, or the fatal error
pub fn on_failure(failures: u32, limit: u32, error: StreamError) -> DriverResult<u32> {
    let failures = failures.saturating_add(1);
    if failures > limit {
        return Err(DriverError::RetriesExhausted {
            failures,
            limit,
            last_error: error,
        });
    }
    Ok(failures)
}

/// How one connection ended
enum StreamEnd {
    Finished(DriverOutcome),
    Failed(StreamError),
}

pub struct StreamDriver<S> {
    source: S,
    controller: WindowController,
    fields: EventFields,
    settings: DriverSettings,
    state: DriverState,
    failures: u32,
}

impl<S: EventSource> StreamDriver<S> {
    pub fn new(
        source: S,
        controller: WindowController,
        fields: EventFields,
        settings: DriverSettings,
    ) -> Self {
        Self {
            source,
            controller,
            fields,
            settings,
            state: DriverState::Connecting,
            failures: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Consecutive failures since the last accepted event
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Collect until STOP, source exhaustion, or a fatal error
    pub async fn run(
        &mut self,
        filter: &StreamFilter,
        buffer: &mut EventBuffer,
    ) -> DriverResult<RunSummary> {
        let mut summary = RunSummary::default();

        loop {
            self.state = DriverState::Connecting;
            let end = match self.source.connect(filter) {
                Ok(stream) => {
                    self.state = DriverState::Streaming;
                    debug!(failures = self.failures, "stream connected");
                    self.consume(stream, buffer, &mut summary).await?
                }
                Err(e) => StreamEnd::Failed(e),
            };

            match end {
                StreamEnd::Finished(outcome) => {
                    self.state = DriverState::Terminated;
                    summary.outcome = Some(outcome);
                    info!(
                        ?outcome,
                        accepted = summary.accepted,
                        ignored = summary.ignored,
                        reconnects = summary.reconnects,
                        "collection finished"
                    );
                    return Ok(summary);
                }
                StreamEnd::Failed(e) => {
                    let limit = self.settings.max_failures;
                    let message = e.to_string();
                    match on_failure(self.failures, limit, e) {
                        Ok(failures) => self.failures = failures,
                        Err(err) => {
                            self.state = DriverState::Terminated;
                            error!(
                                failures = self.failures.saturating_add(1),
                                limit,
                                accepted = summary.accepted,
                                error = %message,
                                "stream failed too many times"
                            );
                            return Err(err);
                        }
                    }

                    self.state = DriverState::Reconnecting;
                    summary.reconnects += 1;
                    warn!(failures = self.failures, limit, error = %message, "stream failed, reconnecting");

                    if self.settings.reconnect_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.settings.reconnect_delay_ms))
                            .await;
                    }
                }
            }
        }
    }

    async fn consume(
        &mut self,
        mut stream: EventStream,
        buffer: &mut EventBuffer,
        summary: &mut RunSummary,
    ) -> DriverResult<StreamEnd> {
        while let Some(item) = stream.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => return Ok(StreamEnd::Failed(e)),
            };

            let event = match RawEvent::parse(line, &self.fields) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "skipping unparseable stream line");
                    summary.unparseable += 1;
                    continue;
                }
            };

            match (self.controller.decide(&event), event.identity_key) {
                (Decision::Accept, Some(identity_key)) => {
                    let sequence_no = buffer
                        .append(&identity_key, &event.serialized_form)
                        .map_err(|source| DriverError::Buffer {
                            identity_key: identity_key.clone(),
                            source,
                        })?;

                    self.failures = 0;
                    summary.accepted += 1;
                    summary.last_sequence_no = Some(sequence_no);
                    debug!(%identity_key, sequence_no, "event buffered");
                }
                (Decision::Stop, _) => {
                    info!(event_time = ?event.event_time, "event past end of execution, stopping");
                    return Ok(StreamEnd::Finished(DriverOutcome::Stopped));
                }
                // Keyless events are never accepted
                (Decision::Ignore | Decision::Accept, identity_key) => {
                    summary.ignored += 1;
                    debug!(identity_key = ?identity_key, event_time = ?event.event_time, "event ignored");
                }
            }
        }

        Ok(StreamEnd::Finished(DriverOutcome::Exhausted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferConfig;
    use crate::types::CollectionWindow;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    enum Script {
        Refuse,
        Items(Vec<Result<String, StreamError>>),
    }

    /// Source replaying one script per connect; refuses once scripts run out
    struct ScriptedSource {
        scripts: VecDeque<Script>,
        connects: usize,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: scripts.into(),
                connects: 0,
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn connect(&mut self, _filter: &StreamFilter) -> Result<EventStream, StreamError> {
            self.connects += 1;
            match self.scripts.pop_front() {
                Some(Script::Items(items)) => Ok(Box::pin(futures::stream::iter(items))),
                Some(Script::Refuse) | None => Err(StreamError::Connect("refused".to_string())),
            }
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn controller() -> WindowController {
        WindowController::new(
            CollectionWindow::new(at(15, 0, 0), at(15, 1, 0), at(15, 1, 30)).unwrap(),
        )
    }

    fn tweet(id: &str, created_at: &str) -> Result<String, StreamError> {
        Ok(format!(
            r#"{{"id_str":"{id}","created_at":"{created_at}","in_reply_to_status_id":null}}"#
        ))
    }

    const IN_WINDOW: &str = "Mon Jan 02 15:00:10 +0000 2023";
    const PAST_END: &str = "Mon Jan 02 15:02:00 +0000 2023";

    fn transient() -> Result<String, StreamError> {
        Err(StreamError::Transient("blip".to_string()))
    }

    fn driver(scripts: Vec<Script>) -> StreamDriver<ScriptedSource> {
        StreamDriver::new(
            ScriptedSource::new(scripts),
            controller(),
            EventFields::default(),
            DriverSettings::default(),
        )
    }

    fn open_buffer(temp_dir: &TempDir) -> EventBuffer {
        EventBuffer::open(BufferConfig::new(temp_dir.path())).unwrap()
    }

    #[test]
    fn test_on_failure_transition() {
        let err = || StreamError::Transient("x".to_string());
        assert_eq!(on_failure(0, 10, err()).unwrap(), 1);
        assert_eq!(on_failure(9, 10, err()).unwrap(), 10);
        assert!(matches!(
            on_failure(10, 10, err()),
            Err(DriverError::RetriesExhausted { failures: 11, limit: 10, .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_ends_run_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let mut driver = driver(vec![Script::Items(vec![
            tweet("1", IN_WINDOW),
            tweet("2", PAST_END),
            tweet("3", IN_WINDOW),
        ])]);

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Stopped));
        assert_eq!(summary.accepted, 1);
        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(driver.failures(), 0);
        assert_eq!(buffer.scan().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_eleven_consecutive_failures_are_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let scripts = (0..11).map(|_| Script::Items(vec![transient()])).collect();
        let mut driver = driver(scripts);

        let err = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap_err();

        match err {
            DriverError::RetriesExhausted {
                failures,
                limit,
                last_error,
            } => {
                assert_eq!(failures, 11);
                assert_eq!(limit, 10);
                assert!(matches!(last_error, StreamError::Transient(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(driver.into_source().connects, 11);
    }

    #[tokio::test]
    async fn test_ten_failures_are_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let mut scripts: Vec<Script> = (0..10).map(|_| Script::Refuse).collect();
        scripts.push(Script::Items(vec![tweet("1", PAST_END)]));
        let mut driver = driver(scripts);

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Stopped));
        assert_eq!(summary.reconnects, 10);
    }

    #[tokio::test]
    async fn test_accept_resets_failure_counter() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let mut scripts: Vec<Script> = (0..10).map(|_| Script::Items(vec![transient()])).collect();
        scripts.push(Script::Items(vec![tweet("1", IN_WINDOW), transient()]));
        scripts.extend((0..9).map(|_| Script::Refuse));
        scripts.push(Script::Items(vec![tweet("2", IN_WINDOW), tweet("3", PAST_END)]));
        let mut driver = driver(scripts);

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Stopped));
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.reconnects, 20);
        assert_eq!(summary.last_sequence_no, Some(2));
    }

    #[tokio::test]
    async fn test_connection_without_accepts_does_not_reset() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        // Each connection yields an ignored event before failing
        let scripts = (0..11)
            .map(|_| Script::Items(vec![tweet("1", "Mon Jan 02 14:00:00 +0000 2023"), transient()]))
            .collect();
        let mut driver = driver(scripts);

        let err = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap_err();
        assert!(matches!(err, DriverError::RetriesExhausted { failures: 11, .. }));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_source_and_ignored_lines() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let unmarked = Ok(format!(r#"{{"id_str":"9","created_at":"{PAST_END}"}}"#));
        let mut driver = driver(vec![Script::Items(vec![
            Ok("not json".to_string()),
            unmarked,
            tweet("1", IN_WINDOW),
            tweet("1", IN_WINDOW),
        ])]);

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Exhausted));
        assert_eq!(summary.unparseable, 1);
        assert_eq!(summary.ignored, 1);
        // Duplicates are buffered as received
        assert_eq!(summary.accepted, 2);
        assert_eq!(buffer.scan().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_keyless_event_in_window_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let keyless = Ok(format!(
            r#"{{"created_at":"{IN_WINDOW}","in_reply_to_status_id":null}}"#
        ));
        let mut driver = driver(vec![Script::Items(vec![keyless, tweet("2", PAST_END)])]);

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Stopped));
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.accepted, 0);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_line_source_read_error_resumes_without_loss() {
        use source::tests::FlakyReader;
        use std::io;
        use tokio::io::BufReader;

        let temp_dir = TempDir::new().unwrap();
        let mut buffer = open_buffer(&temp_dir);
        let first = tweet("1", IN_WINDOW).unwrap() + "\n";
        let second = tweet("2", IN_WINDOW).unwrap() + "\n";
        let stop = tweet("3", PAST_END).unwrap() + "\n";
        let (head, tail) = second.split_at(10);
        let reader = FlakyReader::new(vec![
            Ok((first + head).as_bytes()),
            Err(io::Error::other("pipe hiccup")),
            Ok((tail.to_string() + &stop).as_bytes()),
        ]);
        let mut driver = StreamDriver::new(
            LineSource::from_reader(BufReader::new(reader)),
            controller(),
            EventFields::default(),
            DriverSettings::default(),
        );

        let summary = driver.run(&StreamFilter::default(), &mut buffer).await.unwrap();

        assert_eq!(summary.outcome, Some(DriverOutcome::Stopped));
        assert_eq!(summary.reconnects, 1);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.unparseable, 0);
        let keys: Vec<String> = buffer
            .scan()
            .unwrap()
            .into_iter()
            .map(|r| r.identity_key)
            .collect();
        assert_eq!(keys, vec!["1", "2"]);
    }
}
