//! Typed errors for extraction, filtering and rendering.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Conditions that abort a whole extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document at byte {position}: {source}")]
    Parse {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed document at byte {position}: {reason}")]
    Structure { position: u64, reason: String },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a single placemark was dropped. Never fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("placemark has no name")]
    MissingName,

    #[error("placemark has no coordinates")]
    MissingCoordinates,

    #[error("invalid coordinates {text:?}: {reason}")]
    InvalidCoordinates { text: String, reason: String },

    #[error("malformed placemark: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("start of date range ({start}) is after its end ({end})")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode rendering: {0}")]
    Encode(#[from] serde_json::Error),
}
