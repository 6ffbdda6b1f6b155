//! Agent orchestration
//!
//! Wires the shared task store to the three independent loops and the local
//! endpoint, then waits for the shutdown signal:
//!
//! ```text
//!              +--> HeartbeatClient (writes new tasks)
//! TaskStore <--+--> TaskRunner      (pending -> running -> finished)
//!              +--> Reporter        (finished -> removed)
//!              +--> local endpoint  (load figure only)
//! ```
//!
//! Shutdown aborts everything in flight and kills worker processes. Nothing
//! is drained.

use crate::address::advertise_addr;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::heartbeat::HeartbeatClient;
use crate::reporter::Reporter;
use crate::runner::TaskRunner;
use siphon_domain::ExtractorDescription;
use siphon_extractor::ExtractionExecutor;
use siphon_fetch::ContentFetcher;
use siphon_server::AppState;
use siphon_store::TaskStore;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// A configured agent, ready to run
pub struct Agent {
    config: AgentConfig,
    store: Arc<TaskStore>,
    executor: Arc<dyn ExtractionExecutor>,
    extractors: Vec<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("executor_id", &self.config.executor_id)
            .field("extractors", &self.extractors)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent advertising `extractors`, run by `executor`
    pub fn new(config: AgentConfig, executor: Arc<dyn ExtractionExecutor>, extractors: Vec<String>) -> Self {
        Self {
            config,
            store: Arc::new(TaskStore::new()),
            executor,
            extractors,
        }
    }

    /// The shared task store
    pub fn store(&self) -> Arc<TaskStore> {
        Arc::clone(&self.store)
    }

    /// Describe every advertised extractor through the executor
    pub async fn describe_extractors(&self) -> Result<Vec<ExtractorDescription>, AgentError> {
        let mut descriptions = Vec::with_capacity(self.extractors.len());
        for name in &self.extractors {
            let description = self.executor.describe(name).await?;
            info!(extractor = %name, version = %description.version, "Loaded extractor description");
            descriptions.push(description);
        }
        Ok(descriptions)
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), AgentError>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let config = &self.config;
        let tls = config.tls.load()?;
        let descriptions = self.describe_extractors().await?;

        let listener = siphon_server::bind(config.listen_port).await?;
        let port = listener.local_addr()?.port();
        let advertised = advertise_addr(config.advertise_addr.as_deref(), port);
        info!(executor_id = %config.executor_id, addr = %advertised, extractors = ?self.extractors, "Starting agent");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut loops = JoinSet::new();

        let state = AppState {
            executor: Arc::clone(&self.executor),
            store: Arc::clone(&self.store),
            executor_id: config.executor_id.clone(),
            extractors: Arc::new(descriptions.clone()),
        };
        let mut server_stop = stop_rx.clone();
        loops.spawn(async move {
            let stopped = async move {
                let _ = server_stop.changed().await;
            };
            if let Err(e) = siphon_server::serve(listener, state, stopped).await {
                warn!(error = %e, "Extraction endpoint failed");
            }
        });

        let mut heartbeat = HeartbeatClient::new(
            Arc::clone(&self.store),
            config.coordinator_uri(),
            config.executor_id.clone(),
            advertised,
            descriptions,
        )
        .with_timing(config.heartbeat_interval(), config.reconnect_backoff())
        .with_request_timeout(config.request_timeout());
        if let Some(tls) = &tls {
            heartbeat = heartbeat.with_tls(tls.clone());
        }
        let rx = stop_rx.clone();
        loops.spawn(async move { heartbeat.run(rx).await });

        let fetcher = match &tls {
            Some(tls) => ContentFetcher::with_tls(tls)?,
            None => ContentFetcher::new()?,
        };
        let runner = TaskRunner::new(Arc::clone(&self.store), fetcher, Arc::clone(&self.executor));
        let poll_interval = config.poll_interval();
        let rx = stop_rx.clone();
        loops.spawn(async move { runner.run(poll_interval, rx).await });

        let mut reporter = Reporter::new(
            Arc::clone(&self.store),
            config.ingestion_url(),
            config.executor_id.clone(),
            config.frame_size,
        )
        .with_timeout(config.report_timeout());
        if let Some(tls) = &tls {
            reporter = reporter.with_tls(tls)?;
        }
        let interval = config.heartbeat_interval();
        let rx = stop_rx;
        loops.spawn(async move { reporter.run(interval, rx).await });

        shutdown.await;
        info!(pending = self.store.num_pending_tasks(), "Shutting down agent");

        let _ = stop_tx.send(true);
        loops.abort_all();
        while loops.join_next().await.is_some() {}
        self.executor.shutdown().await;

        info!("Agent stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
