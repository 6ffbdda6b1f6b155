//! Error types for extraction execution

use siphon_domain::ExtractionError;
use thiserror::Error;

/// Errors raised while loading or running extractors
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// No extractor registered under this name
    #[error("Unknown extractor: {0}")]
    UnknownExtractor(String),

    /// Extractor code returned an error for this input
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Extractor code panicked on this input
    #[error("Extractor panicked: {0}")]
    Panicked(String),

    /// Catalog is malformed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Worker process crashed or broke protocol
    #[error("Worker error: {0}")]
    Worker(String),

    /// Worker did not answer in time
    #[error("Extraction timed out after {0}s")]
    Timeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
