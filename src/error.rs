use thiserror::Error;

use crate::location::Provider;

/// Trackbook error types
#[derive(Error, Debug)]
pub enum TrackbookError {
    #[error("Recording already active")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Location permission not granted for {0} provider")]
    PermissionDenied(Provider),

    #[error("{0} provider unavailable")]
    ProviderUnavailable(Provider),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported format version {found} (expected at most {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("Track {0} not found")]
    TrackNotFound(i64),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, TrackbookError>;

impl TrackbookError {
    /// Errors that leave the recording running and should be shown as a banner.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            TrackbookError::PermissionDenied(_) | TrackbookError::ProviderUnavailable(_)
        )
    }
}
