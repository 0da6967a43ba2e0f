use std::path::{Path, PathBuf};

use crate::date::{Timestamp, TimestampError};

#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Resolved absolute path
    pub path: PathBuf,
    /// Capture timestamp, or why none could be recovered
    pub timestamp: Result<Timestamp, TimestampError>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, timestamp: Result<Timestamp, TimestampError>) -> Self {
        Self {
            path: path.into(),
            timestamp,
        }
    }

    /// Identify a file on disk by reading its EXIF capture timestamp.
    pub fn identify(path: &Path) -> Self {
        Self::new(path, crate::date::extract_capture_timestamp(path))
    }

    /// Extension exactly as found on disk, including the leading dot.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }
}
