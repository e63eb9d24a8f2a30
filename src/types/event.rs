//! Event types for the collection buffer
//!
//! A `RawEvent` is what the stream hands us; a `BufferedRecord` is what the
//! buffer persists once the window controller accepts it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::parse_source_timestamp;

/// Names of the top-level fields the collector reads from each raw event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFields {
    /// Field holding the identity key used for deduplication
    pub identity: String,
    /// Field holding the event time; also the field rewritten on export
    pub event_time: String,
    /// Field whose presence makes an event eligible for buffering.
    /// `None` disables the gate.
    pub marker: Option<String>,
}

impl Default for EventFields {
    fn default() -> Self {
        Self {
            identity: "id_str".to_string(),
            event_time: "created_at".to_string(),
            marker: Some("in_reply_to_status_id".to_string()),
        }
    }
}

/// An event read from the stream, with the attributes the collector needs
/// extracted up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Identity key, if the event carries one
    pub identity_key: Option<String>,
    /// Event time parsed from the source format, if present and valid
    pub event_time: Option<NaiveDateTime>,
    /// Whether the configured marker field is present (always true when
    /// the gate is disabled)
    pub has_marker: bool,
    /// The exact text received from the stream
    pub serialized_form: String,
}

impl RawEvent {
    /// Parse a raw stream line
    ///
    /// Fails only when the line is not a JSON document. Missing or malformed
    /// attributes leave the corresponding field empty.
    pub fn parse(serialized_form: String, fields: &EventFields) -> Result<Self, serde_json::Error> {
        let record: Value = serde_json::from_str(&serialized_form)?;
        let object = record.as_object();

        let identity_key = object
            .and_then(|o| o.get(&fields.identity))
            .and_then(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let event_time = object
            .and_then(|o| o.get(&fields.event_time))
            .and_then(Value::as_str)
            .and_then(|text| parse_source_timestamp(text).ok());

        let has_marker = match &fields.marker {
            Some(marker) => object.map(|o| o.contains_key(marker)).unwrap_or(false),
            None => true,
        };

        Ok(Self {
            identity_key,
            event_time,
            has_marker,
            serialized_form,
        })
    }
}

/// An accepted event as persisted by the buffer
///
/// Immutable once written; one JSON line per record in `buffer.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedRecord {
    /// Arrival order, strictly increasing from 1
    #[serde(rename = "seq")]
    pub sequence_no: u64,

    /// Identity key used for deduplication
    #[serde(rename = "key")]
    pub identity_key: String,

    /// The event exactly as received
    #[serde(rename = "raw")]
    pub serialized_form: String,
}

impl BufferedRecord {
    pub fn new(sequence_no: u64, identity_key: String, serialized_form: String) -> Self {
        Self {
            sequence_no,
            identity_key,
            serialized_form,
        }
    }

    /// Serialize record to JSON string (for JSONL)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize record from JSON string
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
