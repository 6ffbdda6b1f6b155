//! Outcome reporter
//!
//! Drains finished tasks from the store and streams each one to the
//! ingestion endpoint over its own websocket connection. A delivered outcome
//! is removed with `mark_reported`; a failed delivery goes through the
//! store's two-strike `report_failed` path. Each delivery is bounded by a
//! deadline so a silent endpoint cannot stall the outcomes queued behind it.

use crate::error::ReportError;
use crate::ingest::{ingest_messages, parse_ack};
use futures::{SinkExt, StreamExt};
use siphon_domain::{CompletedTask, Task};
use siphon_fetch::ClientTls;
use siphon_store::{ReportRetry, TaskStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default deadline for one delivery
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Counts from one reporting pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Outcomes delivered and removed
    pub reported: usize,
    /// Outcomes re-marked `Failed` for another attempt
    pub retried: usize,
    /// Outcomes dropped after a second failure
    pub dropped: usize,
}

/// Streams finished outcomes to the ingestion endpoint
#[derive(Clone)]
pub struct Reporter {
    store: Arc<TaskStore>,
    url: String,
    executor_id: String,
    frame_size: usize,
    timeout: Duration,
    connector: Option<Connector>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("url", &self.url)
            .field("executor_id", &self.executor_id)
            .field("frame_size", &self.frame_size)
            .field("timeout", &self.timeout)
            .field("tls", &self.connector.is_some())
            .finish()
    }
}

impl Reporter {
    /// Create a reporter posting to `url` (`ws://host:port/path`)
    pub fn new(store: Arc<TaskStore>, url: impl Into<String>, executor_id: impl Into<String>, frame_size: usize) -> Self {
        Self {
            store,
            url: url.into(),
            executor_id: executor_id.into(),
            frame_size: frame_size.max(1),
            timeout: DEFAULT_REPORT_TIMEOUT,
            connector: None,
        }
    }

    /// Bound each delivery (connect, send, acknowledgement) by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Present client credentials and trust the given CA on `wss://` URLs
    pub fn with_tls(mut self, tls: &ClientTls) -> Result<Self, ReportError> {
        let mut builder = native_tls::TlsConnector::builder();
        if let Some(ca) = &tls.ca_bundle {
            let cert = native_tls::Certificate::from_pem(ca).map_err(|e| ReportError::Tls(e.to_string()))?;
            builder.add_root_certificate(cert);
        }
        if let Some((cert, key)) = &tls.identity {
            let identity = native_tls::Identity::from_pkcs8(cert, key).map_err(|e| ReportError::Tls(e.to_string()))?;
            builder.identity(identity);
        }
        let connector = builder.build().map_err(|e| ReportError::Tls(e.to_string()))?;
        self.connector = Some(Connector::NativeTls(connector));
        Ok(self)
    }

    /// Deliver one outcome and wait for its acknowledgement
    ///
    /// Fails with [`ReportError::Timeout`] when the whole exchange takes
    /// longer than the configured deadline.
    pub async fn report(&self, task: &Task, outcome: &CompletedTask) -> Result<(), ReportError> {
        tokio::time::timeout(self.timeout, self.deliver(task, outcome))
            .await
            .map_err(|_| ReportError::Timeout(self.timeout))?
    }

    async fn deliver(&self, task: &Task, outcome: &CompletedTask) -> Result<(), ReportError> {
        let (mut socket, _) =
            tokio_tungstenite::connect_async_tls_with_config(self.url.as_str(), None, false, self.connector.clone())
                .await?;

        for message in ingest_messages(task, outcome, &self.executor_id, self.frame_size) {
            socket.send(Message::Text(serde_json::to_string(&message)?)).await?;
        }

        let ack = read_ack(&mut socket).await;
        if let Err(e) = socket.close(None).await {
            debug!(error = %e, "Ingestion socket already closed");
        }
        ack
    }

    /// Report every finished task once
    pub async fn report_finished(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();

        for (task, outcome) in self.store.finished_tasks() {
            match self.report(&task, &outcome).await {
                Ok(()) => {
                    info!(task_id = %task.id, outcome = %outcome.outcome, content = outcome.content.len(), features = outcome.features.len(), "Reported task");
                    match self.store.mark_reported(&task.id) {
                        Ok(()) => summary.reported += 1,
                        Err(e) => warn!(task_id = %task.id, error = %e, "Reported task vanished from store"),
                    }
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Failed to report task");
                    match self.store.report_failed(&task.id) {
                        Ok(ReportRetry::Retry) => summary.retried += 1,
                        Ok(ReportRetry::Dropped) => summary.dropped += 1,
                        Err(e) => warn!(task_id = %task.id, error = %e, "Failed task vanished from store"),
                    }
                }
            }
        }
        summary
    }

    /// Report on every tick until shutdown
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        info!(url = %self.url, "Outcome reporter started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.report_finished().await;
                    if summary != ReportSummary::default() {
                        debug!(?summary, "Reporting pass done");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Outcome reporter stopped");
    }
}

async fn read_ack(socket: &mut Socket) -> Result<(), ReportError> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => return parse_ack(&text),
            Message::Close(Some(frame)) if frame.code == CloseCode::Normal => return Ok(()),
            Message::Close(frame) => {
                let reason = frame.map_or_else(|| "no close frame".to_string(), |f| format!("{} {}", f.code, f.reason));
                return Err(ReportError::Closed(reason));
            }
            // Pings are answered by the library
            _ => continue,
        }
    }
    Err(ReportError::Closed("stream ended before acknowledgement".to_string()))
}
