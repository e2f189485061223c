//! Error types for the Riap::Simple client.
//!
//! Errors fall into two groups. Connection establishment failures
//! (`ConnectFailed`) are retryable; everything else is terminal and is
//! returned to the caller as soon as it happens.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the Riap::Simple client.
#[derive(Debug, Error)]
pub enum RiapError {
    // Request shape errors
    #[error("{message}")]
    Validation { status: u16, message: String },

    // URL errors
    #[error("Invalid URL scheme in '{url}', expected riap+tcp, riap+unix or riap+pipe")]
    InvalidScheme { url: String },

    #[error("Malformed URL '{url}': {message}")]
    MalformedUrl { url: String, message: String },

    #[error("Please specify a resource uri, either in the server URL or as the `uri` request field")]
    MissingResourceUri,

    #[error("Can't resolve path {path:?}: {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Transport errors
    #[error("Can't connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{source} (retried)")]
    Retried {
        attempts: u32,
        #[source]
        source: Box<RiapError>,
    },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {after:?} while {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Request cancelled")]
    Cancelled,

    // Wire format errors
    #[error("Can't encode request: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, RiapError>;

impl RiapError {
    /// Create a protocol error without an underlying cause.
    pub fn protocol(message: impl Into<String>) -> Self {
        RiapError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a 400-class validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        RiapError::Validation {
            status: 400,
            message: message.into(),
        }
    }

    /// Check if this error should trigger another connect attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RiapError::ConnectFailed { .. })
    }

    /// Convert to a Riap status code.
    ///
    /// - 400: the caller's URL or request is wrong
    /// - 500: the connection or the local system failed
    /// - 502: the peer violated the wire protocol
    /// - 504: a deadline expired
    pub fn status_code(&self) -> u16 {
        match self {
            RiapError::Validation { status, .. } => *status,

            RiapError::InvalidScheme { .. }
            | RiapError::MalformedUrl { .. }
            | RiapError::MissingResourceUri
            | RiapError::Encode { .. } => 400,

            RiapError::Protocol { .. } => 502,

            RiapError::Timeout { .. } => 504,

            RiapError::Retried { source, .. } => source.status_code(),

            RiapError::PathResolution { .. }
            | RiapError::ConnectFailed { .. }
            | RiapError::Io { .. }
            | RiapError::Cancelled
            | RiapError::Config { .. } => 500,
        }
    }

    /// Render the error as a Riap envelope: `[status, message]`.
    pub fn into_envelope(self) -> serde_json::Value {
        serde_json::json!([self.status_code(), self.to_string()])
    }
}
