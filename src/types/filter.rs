//! Subscription filter passed through to the event source

use serde::{Deserialize, Serialize};

/// Keyword and language filter for the upstream subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamFilter {
    /// Name of the filter; becomes the `filter_name` partition label
    pub name: String,
    /// Comma-separated track terms
    pub track: String,
    /// Language tags
    pub languages: Vec<String>,
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            track: String::new(),
            languages: Vec::new(),
        }
    }
}

impl StreamFilter {
    /// Track terms, split on commas and trimmed
    pub fn track_terms(&self) -> Vec<String> {
        self.track
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect()
    }
}
