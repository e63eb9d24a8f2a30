//! Upstream event sources
//!
//! The driver only needs something that, given a filter, produces a stream
//! of raw serialized events or fails. `LineSource` is the bundled source: it
//! reads newline-delimited events from a file, stdin or any buffered reader,
//! which covers replays and piping a streaming client's output into the
//! collector.

use std::io::{self, Seek, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::StreamFilter;

/// Stream of raw serialized events as yielded by a connected source
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

/// Transient failures of the upstream source
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transient upstream error: {0}")]
    Transient(String),
}

/// A subscribable upstream
pub trait EventSource: Send {
    /// Open a new subscription for `filter`
    ///
    /// Called again after every failure, so implementations must be able to
    /// reconnect.
    fn connect(&mut self, filter: &StreamFilter) -> Result<EventStream, StreamError>;
}

/// A buffered reader and the bytes of a line it has not finished yet
struct LineReader {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    pending: Vec<u8>,
}

impl LineReader {
    fn new<R: AsyncBufRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            pending: Vec::new(),
        }
    }
}

type SharedReader = Arc<Mutex<LineReader>>;

enum Input {
    /// Reopened on every connect, positioned after the lines already read
    File(PathBuf),
    /// Kept across connects, together with any half-read line
    Reader(SharedReader),
}

/// Newline-delimited event source
///
/// A reconnect continues right after the last complete line handed out, so
/// a failure mid-stream neither repeats nor loses events. Blank lines and
/// lines that are not valid UTF-8 are skipped. One connection reads at a
/// time; a new stream waits until the previous one is dropped.
pub struct LineSource {
    input: Input,
    /// Bytes of complete lines consumed so far
    consumed: Arc<AtomicU64>,
}

impl LineSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            input: Input::File(path.into()),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R: AsyncBufRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self {
            input: Input::Reader(Arc::new(Mutex::new(LineReader::new(reader)))),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bytes of input consumed as complete lines
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }
}

impl EventSource for LineSource {
    fn connect(&mut self, filter: &StreamFilter) -> Result<EventStream, StreamError> {
        // Lines arrive pre-filtered; the terms are only reported
        debug!(filter = %filter.name, track = ?filter.track_terms(), languages = ?filter.languages, "connecting line source");

        let reader = match &self.input {
            Input::File(path) => {
                let offset = self.consumed();
                let cannot_open =
                    |e: io::Error| StreamError::Connect(format!("cannot open {}: {e}", path.display()));
                let mut file = std::fs::File::open(path).map_err(cannot_open)?;
                file.seek(SeekFrom::Start(offset)).map_err(cannot_open)?;
                if offset > 0 {
                    debug!(path = %path.display(), offset, "resuming input file");
                }
                let file = BufReader::new(tokio::fs::File::from_std(file));
                Arc::new(Mutex::new(LineReader::new(file)))
            }
            Input::Reader(shared) => Arc::clone(shared),
        };

        Ok(Box::pin(read_lines(reader, Arc::clone(&self.consumed))))
    }
}

/// Strip the line terminator; `None` for blank lines
fn decode_line(mut raw: Vec<u8>) -> Result<Option<String>, std::string::FromUtf8Error> {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    let line = String::from_utf8(raw)?;
    Ok((!line.trim().is_empty()).then_some(line))
}

fn read_lines(
    shared: SharedReader,
    consumed: Arc<AtomicU64>,
) -> impl Stream<Item = Result<String, StreamError>> + Send {
    try_stream! {
        let mut guard = shared.lock_owned().await;
        loop {
            let LineReader { reader, pending } = &mut *guard;
            // Bytes read before an error stay in `pending` for the next connect
            let read = reader
                .read_until(b'\n', pending)
                .await
                .map_err(StreamError::from)?;
            if read == 0 && pending.is_empty() {
                break;
            }

            let raw = std::mem::take(pending);
            let offset = consumed.fetch_add(raw.len() as u64, Ordering::SeqCst);
            match decode_line(raw) {
                Ok(Some(line)) => yield line,
                Ok(None) => {}
                Err(e) => warn!(offset, error = %e.utf8_error(), "skipping line that is not valid UTF-8"),
            }
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::fs;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::{AsyncRead, ReadBuf};

    /// Reader serving scripted chunks, some of which are read errors
    pub(in crate::driver) struct FlakyReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl FlakyReader {
        pub(in crate::driver) fn new(chunks: Vec<io::Result<&[u8]>>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| c.map(<[u8]>::to_vec)).collect(),
            }
        }
    }

    impl AsyncRead for FlakyReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.chunks.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    async fn drain(mut stream: EventStream) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(item) = stream.next().await {
            lines.push(item.unwrap());
        }
        lines
    }

    #[tokio::test]
    async fn test_file_lines_skip_blanks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        fs::write(&path, "{\"a\":1}\n\n  \r\n{\"b\":2}\r\n").unwrap();

        let mut source = LineSource::file(&path);
        let lines = drain(source.connect(&StreamFilter::default()).unwrap()).await;

        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn test_file_reconnect_resumes_after_last_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        fs::write(&path, "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n").unwrap();

        let mut source = LineSource::file(&path);
        let filter = StreamFilter::default();

        let mut stream = source.connect(&filter).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), r#"{"a":1}"#);
        drop(stream);

        let rest = drain(source.connect(&filter).unwrap()).await;
        assert_eq!(rest, vec![r#"{"b":2}"#, r#"{"c":3}"#]);
        assert!(drain(source.connect(&filter).unwrap()).await.is_empty());
        assert_eq!(source.consumed(), 24);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        fs::write(&path, b"{\"a\":1}\n\xff\xfe bad\n{\"b\":2}\n").unwrap();

        let mut source = LineSource::file(&path);
        let lines = drain(source.connect(&StreamFilter::default()).unwrap()).await;

        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn test_read_error_keeps_buffered_input() {
        let reader = FlakyReader::new(vec![
            Ok(&b"{\"a\":1}\n{\"b\""[..]),
            Err(io::Error::other("pipe hiccup")),
            Ok(&b":2}\n{\"c\":3}\n"[..]),
        ]);
        let mut source = LineSource::from_reader(BufReader::new(reader));
        let filter = StreamFilter::default();

        let mut stream = source.connect(&filter).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), r#"{"a":1}"#);
        assert!(matches!(stream.next().await, Some(Err(StreamError::Io(_)))));
        drop(stream);

        let rest = drain(source.connect(&filter).unwrap()).await;
        assert_eq!(rest, vec![r#"{"b":2}"#, r#"{"c":3}"#]);
    }

    #[test]
    fn test_missing_file_is_connect_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = LineSource::file(temp_dir.path().join("missing.jsonl"));

        let err = source.connect(&StreamFilter::default()).err().unwrap();
        assert!(matches!(err, StreamError::Connect(_)));
    }
}
