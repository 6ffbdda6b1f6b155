//! Error types for content fetching

use thiserror::Error;

/// Errors that can occur while fetching one piece of content
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL scheme has no backend
    #[error("Unsupported storage url: {0}")]
    UnsupportedUrl(String),

    /// URL could not be parsed
    #[error("Invalid storage url: {0}")]
    InvalidUrl(String),

    /// Local read failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Local path that was read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP response with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Object storage failure
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Client TLS material was rejected
    #[error("TLS configuration error: {0}")]
    Tls(String),
}
