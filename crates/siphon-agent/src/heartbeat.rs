//! Registration and heartbeat client
//!
//! ```text
//! Unregistered --register--> Registered --open stream--> Streaming
//!      ^                                                    |
//!      +------------- backoff <---- error or close ---------+
//! ```
//!
//! Every session opens a fresh channel, so a coordinator restart is picked
//! up on the next attempt. Connect and registration are bounded by the
//! request timeout; HTTP/2 keep-alive pings surface a dead link on an open
//! stream as an error. Heartbeats carry the store's pending count;
//! responses carry new tasks, which go straight into the store.

use crate::error::AgentError;
use siphon_domain::ExtractorDescription;
use siphon_fetch::ClientTls;
use siphon_grpc::conversions::{description_to_proto, task_from_proto};
use siphon_grpc::proto::{HeartbeatRequest, RegisterExecutorRequest};
use siphon_grpc::CoordinatorServiceClient;
use siphon_store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{debug, info, warn};

/// Keeps the agent registered and receives task assignments
#[derive(Debug, Clone)]
pub struct HeartbeatClient {
    store: Arc<TaskStore>,
    coordinator_uri: String,
    executor_id: String,
    advertise_addr: String,
    extractors: Vec<ExtractorDescription>,
    interval: Duration,
    backoff: Duration,
    request_timeout: Duration,
    tls: Option<ClientTls>,
}

impl HeartbeatClient {
    /// Create a client for `coordinator_uri` (`http://host:port`)
    pub fn new(
        store: Arc<TaskStore>,
        coordinator_uri: impl Into<String>,
        executor_id: impl Into<String>,
        advertise_addr: impl Into<String>,
        extractors: Vec<ExtractorDescription>,
    ) -> Self {
        Self {
            store,
            coordinator_uri: coordinator_uri.into(),
            executor_id: executor_id.into(),
            advertise_addr: advertise_addr.into(),
            extractors,
            interval: Duration::from_secs(5),
            backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            tls: None,
        }
    }

    /// Set the heartbeat interval and re-registration backoff
    pub fn with_timing(mut self, interval: Duration, backoff: Duration) -> Self {
        self.interval = interval;
        self.backoff = backoff;
        self
    }

    /// Bound connect, registration and keep-alive acknowledgements
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Use mutual TLS on the control channel
    pub fn with_tls(mut self, tls: ClientTls) -> Self {
        self.tls = Some(tls);
        self
    }

    async fn connect(&self) -> Result<Channel, AgentError> {
        let mut endpoint = Endpoint::from_shared(self.coordinator_uri.clone())?
            .connect_timeout(self.request_timeout)
            .http2_keep_alive_interval(self.interval)
            .keep_alive_timeout(self.request_timeout)
            .keep_alive_while_idle(true);
        if let Some(tls) = &self.tls {
            let mut config = ClientTlsConfig::new();
            if let Some(ca) = &tls.ca_bundle {
                config = config.ca_certificate(Certificate::from_pem(ca));
            }
            if let Some((cert, key)) = &tls.identity {
                config = config.identity(Identity::from_pem(cert, key));
            }
            endpoint = endpoint.tls_config(config)?;
        }
        Ok(endpoint.connect().await?)
    }

    /// Announce this agent to the coordinator
    pub async fn register(&self, client: &mut CoordinatorServiceClient<Channel>) -> Result<(), AgentError> {
        let request = RegisterExecutorRequest {
            executor_id: self.executor_id.clone(),
            addr: self.advertise_addr.clone(),
            extractors: self.extractors.iter().map(description_to_proto).collect(),
        };
        tokio::time::timeout(self.request_timeout, client.register_executor(request))
            .await
            .map_err(|_| AgentError::Registration(format!("no answer within {:?}", self.request_timeout)))?
            .map_err(|status| AgentError::Registration(status.to_string()))?;
        info!(executor_id = %self.executor_id, addr = %self.advertise_addr, "Registered with coordinator");
        Ok(())
    }

    /// One full session: connect, register, stream until failure
    ///
    /// Only returns `Ok` when the coordinator closes the stream cleanly.
    pub async fn session(&self) -> Result<(), AgentError> {
        let channel = self.connect().await?;
        let mut client = CoordinatorServiceClient::new(channel);
        self.register(&mut client).await?;

        let store = Arc::clone(&self.store);
        let executor_id = self.executor_id.clone();
        let outbound = IntervalStream::new(tokio::time::interval(self.interval)).map(move |_| HeartbeatRequest {
            executor_id: executor_id.clone(),
            pending_tasks: store.num_pending_tasks() as u64,
        });

        let mut inbound = tokio::time::timeout(self.request_timeout, client.heartbeat(outbound))
            .await
            .map_err(|_| AgentError::Heartbeat(format!("stream not opened within {:?}", self.request_timeout)))?
            .map_err(|status| AgentError::Heartbeat(status.to_string()))?
            .into_inner();
        debug!("Heartbeat stream open");

        while let Some(response) = inbound
            .message()
            .await
            .map_err(|status| AgentError::Heartbeat(status.to_string()))?
        {
            if response.tasks.is_empty() {
                continue;
            }
            let mut tasks = Vec::with_capacity(response.tasks.len());
            for task in response.tasks {
                match task_from_proto(task) {
                    Ok(task) => tasks.push(task),
                    Err(e) => warn!(error = %e, "Ignoring malformed task"),
                }
            }
            let received = tasks.len();
            let added = self.store.add_tasks(tasks);
            debug!(received, added, "Received tasks");
        }
        Ok(())
    }

    /// Stay registered until shutdown, re-registering after every failure
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(coordinator = %self.coordinator_uri, "Heartbeat client started");
        loop {
            tokio::select! {
                result = self.session() => match result {
                    Ok(()) => warn!("Coordinator closed the heartbeat stream"),
                    Err(e) => warn!(error = %e, "Control channel failed"),
                },
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {
                    debug!("Re-registering");
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Heartbeat client stopped");
    }
}
