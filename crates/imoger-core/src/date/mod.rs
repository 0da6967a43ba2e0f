pub mod exif;

use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use thiserror::Error;

/// Capture instant as recorded by the camera: civil time, second precision, no zone.
pub type Timestamp = NaiveDateTime;

/// Why a file has no usable capture timestamp. Every variant means "skip and report".
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TimestampError {
    #[error("no capture timestamp in metadata")]
    Missing,
    #[error("malformed capture timestamp: {0}")]
    Malformed(String),
    #[error("unreadable file: {0}")]
    Unreadable(String),
}

/// Read the capture timestamp embedded in an image file.
pub fn extract_capture_timestamp(path: &Path) -> Result<Timestamp, TimestampError> {
    exif::extract_exif_timestamp(path)
}

/// Drop any sub-second component so equality compares the six civil fields only.
pub fn truncate_to_seconds(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}
