//! Error types for the adrivefs library.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for adrivefs operations.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Non-success HTTP status from a raw transfer (download or part upload).
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Network request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error (token store, config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The drive API answered with an error body.
    #[error("API error {status}: {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Path or node does not exist.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// Rejected before any remote call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Token refresh or interactive login failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Operation not supported by this handle or open mode.
    #[error("Not supported")]
    NotSupported,

    /// Mutating call while the filesystem is mounted read-only.
    #[error("Permission denied: filesystem is read-only")]
    PermissionDenied,

    /// Removal of the mount root was requested.
    #[error("Cannot remove root folder")]
    CannotRemoveRoot,

    /// A background transfer was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Error fanned out to every waiter of a deduplicated call.
    #[error(transparent)]
    Shared(Arc<DriveError>),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl DriveError {
    /// True for any flavor of "does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            DriveError::NotFound(_) => true,
            DriveError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// True when the remote refused a create/move because the name is taken.
    pub fn is_conflict(&self) -> bool {
        match self {
            DriveError::Api { code, .. } => code.starts_with("AlreadyExist"),
            DriveError::Shared(inner) => inner.is_conflict(),
            _ => false,
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DriveError::HttpStatus { status, .. } | DriveError::Api { status, .. } => Some(*status),
            DriveError::Request(e) => e.status().map(|s| s.as_u16()),
            DriveError::Shared(inner) => inner.status(),
            _ => None,
        }
    }
}

/// Result type alias for adrivefs operations.
pub type Result<T> = std::result::Result<T, DriveError>;
