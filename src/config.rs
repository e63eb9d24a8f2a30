//! Collector configuration
//!
//! Loaded from a JSON document; every field has a default so a partial (or
//! absent) file works. The data directory can be overridden through
//! `STREAM_HARVEST_DATA_DIR`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::BufferConfig;
use crate::driver::DriverSettings;
use crate::types::{EventFields, StreamFilter};
use crate::window::WindowSchedule;

/// Environment variable overriding `data_dir`
pub const DATA_DIR_ENV: &str = "STREAM_HARVEST_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub filter: StreamFilter,
    pub schedule: WindowSchedule,
    /// Directory holding the buffer, the run manifest and the artifact
    pub data_dir: PathBuf,
    /// File name of the handoff artifact inside `data_dir`
    pub artifact_name: String,
    pub fields: EventFields,
    pub driver: DriverSettings,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            filter: StreamFilter::default(),
            schedule: WindowSchedule::default(),
            data_dir: PathBuf::from("tmp"),
            artifact_name: "twitter_stream.json".to_string(),
            fields: EventFields::default(),
            driver: DriverSettings::default(),
        }
    }
}

impl CollectorConfig {
    /// Load and validate a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STREAM_HARVEST_DATA_DIR` if it is set
    pub fn with_env_overrides(self) -> Self {
        self.with_data_dir_override(env::var(DATA_DIR_ENV).ok())
    }

    /// Replace `data_dir`, resolving a relative override against the
    /// current directory
    pub fn with_data_dir_override(mut self, data_dir: Option<String>) -> Self {
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            let path = PathBuf::from(dir);
            self.data_dir = if path.is_absolute() {
                path
            } else {
                env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(path)
            };
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.name.trim().is_empty() {
            return Err(ConfigError::Invalid("filter.name must not be empty".to_string()));
        }
        if self.artifact_name.trim().is_empty()
            || Path::new(&self.artifact_name).components().count() != 1
        {
            return Err(ConfigError::Invalid(format!(
                "artifact_name {:?} must be a plain file name",
                self.artifact_name
            )));
        }
        if self.fields.identity.is_empty() || self.fields.event_time.is_empty() {
            return Err(ConfigError::Invalid(
                "fields.identity and fields.event_time must be set".to_string(),
            ));
        }
        if matches!(&self.fields.marker, Some(marker) if marker.is_empty()) {
            return Err(ConfigError::Invalid(
                "fields.marker must be null or a field name".to_string(),
            ));
        }
        Ok(())
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.data_dir.join(&self.artifact_name)
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig::new(&self.data_dir)
    }
}
