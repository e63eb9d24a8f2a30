//! Timestamp Normalizer
//!
//! Rewrites every upstream timestamp embedded in a record into the canonical
//! `YYYY-MM-DD HH:MM:SS` form by textual substitution on the serialized
//! form, leaving every other byte as received.
//!
//! Each value found by the walk consumes exactly one occurrence: the first
//! one still present in the text. Distinct fields that happen to share the
//! same text are therefore each replaced once, in walk order.
//!
//! The canonical form never parses as an upstream timestamp, so running the
//! normalizer over its own output fails with `MalformedTimestamp` instead of
//! silently rewriting twice.

mod walk;

pub use walk::collect_field_values;

use serde_json::Value;
use thiserror::Error;

use crate::utils::{format_canonical, parse_source_timestamp};

/// Result type for normalization
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Errors that make a record impossible to normalize; all are fatal for the run
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record is not valid JSON: {0}")]
    InvalidRecord(#[from] serde_json::Error),
    #[error("malformed timestamp {value} under `{field}`: {reason}")]
    MalformedTimestamp {
        field: String,
        value: String,
        reason: String,
    },
    #[error("timestamp text {value:?} has no remaining occurrence in the serialized record")]
    OccurrenceMissing { value: String },
}

/// Normalizes the timestamps stored under one field name
#[derive(Debug, Clone)]
pub struct Normalizer {
    field: String,
}

impl Normalizer {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Field name whose values are rewritten
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Normalize one serialized record
    ///
    /// Line terminators are stripped from both ends of the result once all
    /// substitutions are done.
    pub fn normalize(&self, serialized_form: &str) -> NormalizeResult<String> {
        let record: Value = serde_json::from_str(serialized_form)?;
        let mut line = serialized_form.to_string();

        for value in collect_field_values(&record, &self.field) {
            let original = value
                .as_str()
                .ok_or_else(|| NormalizeError::MalformedTimestamp {
                    field: self.field.clone(),
                    value: value.to_string(),
                    reason: "expected a string".to_string(),
                })?;

            let parsed =
                parse_source_timestamp(original).map_err(|e| NormalizeError::MalformedTimestamp {
                    field: self.field.clone(),
                    value: format!("{original:?}"),
                    reason: e.to_string(),
                })?;
            let canonical = format_canonical(&parsed);

            let position = line
                .find(original)
                .ok_or_else(|| NormalizeError::OccurrenceMissing {
                    value: original.to_string(),
                })?;
            line.replace_range(position..position + original.len(), &canonical);
        }

        Ok(line.trim_matches(&['\r', '\n'][..]).to_string())
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new("created_at")
    }
}
