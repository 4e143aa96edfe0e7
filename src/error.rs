//! Error types for Feedscout.

use thiserror::Error;

/// Common error type for Feedscout.
#[derive(Error, Debug)]
pub enum ScoutError {
    /// A catalog page could not be fetched.
    ///
    /// The scan step that needed the page is aborted and the cursor is left untouched.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A source preview could not be fetched or parsed.
    ///
    /// These never leave the preview cache; they are stored as negative results.
    #[error("preview error: {0}")]
    Preview(String),

    /// Transport level failure talking to the backend.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The subscription collaborator rejected a change.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Key-value persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for ScoutError {
    fn from(e: reqwest::Error) -> Self {
        ScoutError::Http(e.to_string())
    }
}

/// Result type alias for Feedscout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;
