//! Siphon Agent
//!
//! The field agent: stays registered with a coordinator, receives task
//! assignments over the heartbeat stream, runs them through the extraction
//! executor and reports each outcome to the ingestion endpoint.
//!
//! ## Loops
//!
//! Three loops share one [`siphon_store::TaskStore`] and never wait on each
//! other:
//!
//! - [`heartbeat::HeartbeatClient`] writes new tasks in
//! - [`runner::TaskRunner`] fetches, extracts and records outcomes
//! - [`reporter::Reporter`] streams outcomes out and removes them
//!
//! ## Reporting guarantees
//!
//! An outcome stays in the store until the ingestion endpoint acknowledges
//! it. A failed delivery is retried once as `Failed`; a second failure drops
//! the task without telling the coordinator, which is expected to have timed
//! it out already.

#![warn(missing_docs)]

pub mod address;
pub mod agent;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ingest;
pub mod reporter;
pub mod runner;

pub use agent::{shutdown_signal, Agent};
pub use config::{AgentConfig, ConfigError, TlsConfig};
pub use error::{AgentError, ReportError};
pub use heartbeat::HeartbeatClient;
pub use ingest::{ingest_messages, IngestMessage};
pub use reporter::{ReportSummary, Reporter};
pub use runner::TaskRunner;
