use std::time::Duration;
use thiserror::Error;

/// Marker the backend puts in its message when a person's record quota is full.
const CAPACITY_MARKER: &str = "5 ta yozuv";

/// Failures of a round trip to the backend. None of them are fatal to a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("record quota exhausted: {0}")]
    Capacity(String),

    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Classifies an error message from the backend, recognising the record
    /// quota message.
    pub fn from_backend_message(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(CAPACITY_MARKER) {
            GatewayError::Capacity(message)
        } else {
            GatewayError::Status { code, message }
        }
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, GatewayError::Capacity(_))
    }
}

/// No usable video frame for this tick.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no video frame available")]
    NoFrame,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A roster file rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported file type: {name} (expected .xlsx, .xls or .docx)")]
    UnsupportedType { name: String },

    #[error("file is too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("file is empty")]
    Empty,
}

/// Errors returned by controller operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("camera is unavailable: {0}")]
    CameraUnavailable(GatewayError),

    #[error("session is not running")]
    NotRunning,

    #[error("no recognized person")]
    NoSubject,

    #[error("session runtime has shut down")]
    RuntimeClosed,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
