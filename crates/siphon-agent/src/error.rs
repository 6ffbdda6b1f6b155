//! Error types for the agent

use crate::config::ConfigError;
use siphon_extractor::ExtractorError;
use siphon_fetch::FetchError;
use siphon_grpc::ConversionError;
use siphon_store::StoreError;
use thiserror::Error;

/// Errors raised by the agent's loops and startup
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registration with the coordinator failed
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Heartbeat stream failed or was closed
    #[error("Heartbeat failed: {0}")]
    Heartbeat(String),

    /// Control channel could not be established
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Coordinator returned an error status
    #[error("gRPC error: {0}")]
    Status(#[from] tonic::Status),

    /// Coordinator sent a malformed message
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Content fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction error
    #[error("Extraction error: {0}")]
    Extractor(#[from] ExtractorError),

    /// Task store rejected a transition
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Local endpoint error
    #[error(transparent)]
    Server(#[from] siphon_server::ServerError),

    /// Outcome reporting error
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors delivering one task outcome to the ingestion endpoint
#[derive(Error, Debug)]
pub enum ReportError {
    /// Websocket connect, send or receive failed
    #[error("Ingestion connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// Ingestion endpoint answered with an `Error` acknowledgement
    #[error("Ingestion rejected outcome: {0}")]
    Rejected(String),

    /// Connection closed without a usable acknowledgement
    #[error("Ingestion connection closed: {0}")]
    Closed(String),

    /// Message encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No acknowledgement within the delivery deadline
    #[error("Ingestion timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// TLS connector could not be built
    #[error("TLS error: {0}")]
    Tls(String),
}
