//! Siphon Local Extraction Endpoint
//!
//! A small HTTP interface next to the agent:
//!
//! - `GET /`: agent banner
//! - `GET /health`: liveness plus pending task count
//! - `GET /extractors`: advertised extractor descriptions
//! - `POST /extract`: run one extraction and return its outputs
//!
//! It shares the agent's executor, so requests here and assigned tasks
//! compete for the same workers.

#![warn(missing_docs)]

pub mod handlers;

pub use handlers::{create_router, AppState, ExtractRequest, ExtractResponse};

use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Server binding error
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Bind the endpoint on all interfaces
///
/// Port 0 picks an ephemeral port; read it back from the listener.
pub async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    Ok(TcpListener::bind(("0.0.0.0", port)).await?)
}

/// Serve on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Extraction endpoint listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    info!("Extraction endpoint stopped");
    Ok(())
}
