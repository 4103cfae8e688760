//! Error types for the session client.

use thiserror::Error;

/// Client error type.
///
/// Session-fatal conditions (`SessionEnded`, `CorruptIdentity`) are reported
/// after the credential record has already been purged; callers only need to
/// message the action-local ones (`Forbidden`, `Api`).
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The user is authenticated but may not perform this action (403).
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Error message from the API.
        message: String,
    },

    /// The server rejected the credential (401); it has been purged.
    #[error("Session ended")]
    SessionEnded,

    /// No bearer token is stored.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The persisted identity snapshot could not be read.
    #[error("Corrupt identity snapshot: {0}")]
    CorruptIdentity(String),
}

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Forbidden { .. } => Some(403),
            Self::SessionEnded => Some(401),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
