use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions that stop the service or prevent it from starting.
///
/// Per-file problems (vanished files, validator failures) never surface here;
/// they are logged and skipped by the processor.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Failed to initialize file watcher for {path}: {source}")]
    Watcher {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("History file {path} is corrupt: {source}")]
    HistoryFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation service is already running")]
    AlreadyRunning,

    #[error("Validation service is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, SentinelError>;
