//! Agent configuration
//!
//! Loaded from a TOML file; every key is optional. The CLI overrides
//! individual fields from flags and environment variables afterwards, then
//! calls [`AgentConfig::validate`].

use serde::{Deserialize, Serialize};
use siphon_fetch::ClientTls;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A TLS file could not be read
    #[error("Failed to read TLS file {path}: {source}")]
    TlsFile {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Mutual TLS material, as file paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM CA bundle used to verify the coordinator and ingestion servers
    pub ca_bundle: Option<PathBuf>,
    /// PEM client certificate chain
    pub cert: Option<PathBuf>,
    /// PEM PKCS#8 private key
    pub key: Option<PathBuf>,
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::TlsFile {
        path: path.to_path_buf(),
        source,
    })
}

impl TlsConfig {
    /// Whether any TLS material is configured
    pub fn is_enabled(&self) -> bool {
        self.ca_bundle.is_some() || self.cert.is_some() || self.key.is_some()
    }

    /// Read the configured files, `None` when TLS is off
    pub fn load(&self) -> Result<Option<ClientTls>, ConfigError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let ca_bundle = self.ca_bundle.as_deref().map(read_pem).transpose()?;
        let identity = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "tls.cert and tls.key must be set together".to_string(),
                ))
            }
        };
        Ok(Some(ClientTls { ca_bundle, identity }))
    }
}

/// Agent configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent identity reported to the coordinator
    pub executor_id: String,

    /// Coordinator gRPC address (host:port)
    pub coordinator_addr: String,

    /// Ingestion websocket address (host:port)
    pub ingestion_addr: String,

    /// Ingestion websocket path
    pub ingestion_path: String,

    /// Local extraction endpoint port, 0 for ephemeral
    pub listen_port: u16,

    /// Advertised host, auto-discovered when unset
    pub advertise_addr: Option<String>,

    /// Number of extraction worker processes
    pub workers: usize,

    /// Extractor catalog file; built-ins only when unset
    pub catalog_path: Option<PathBuf>,

    /// Extractors to advertise; every catalog entry when empty
    pub extractors: Vec<String>,

    /// Heartbeat and reporter tick (seconds)
    pub heartbeat_interval_secs: u64,

    /// Wait before re-registering after a control-channel failure (seconds)
    pub reconnect_backoff_secs: u64,

    /// Fetch-execute loop fallback poll (milliseconds)
    pub poll_interval_ms: u64,

    /// Multipart frame size in bytes
    pub frame_size: usize,

    /// Per-batch worker deadline (seconds)
    pub extraction_timeout_secs: u64,

    /// Deadline for delivering one outcome to ingestion (seconds)
    pub report_timeout_secs: u64,

    /// Deadline for control-channel connect and registration (seconds)
    pub request_timeout_secs: u64,

    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Mutual TLS material
    pub tls: TlsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            executor_id: uuid::Uuid::now_v7().to_string(),
            coordinator_addr: "localhost:8950".to_string(),
            ingestion_addr: "localhost:8900".to_string(),
            ingestion_path: "/write_content".to_string(),
            listen_port: 0,
            advertise_addr: None,
            workers: 1,
            catalog_path: None,
            extractors: Vec::new(),
            heartbeat_interval_secs: 5,
            reconnect_backoff_secs: 5,
            poll_interval_ms: 500,
            frame_size: 1024 * 1024,
            extraction_timeout_secs: siphon_extractor::DEFAULT_TIMEOUT_SECS,
            report_timeout_secs: 30,
            request_timeout_secs: 30,
            log_level: "info".to_string(),
            tls: TlsConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` when given, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.executor_id.trim().is_empty() {
            return invalid("executor_id must not be empty");
        }
        if self.coordinator_addr.trim().is_empty() {
            return invalid("coordinator_addr must not be empty");
        }
        if self.ingestion_addr.trim().is_empty() {
            return invalid("ingestion_addr must not be empty");
        }
        if !self.ingestion_path.starts_with('/') {
            return invalid("ingestion_path must start with '/'");
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.heartbeat_interval_secs == 0 {
            return invalid("heartbeat_interval_secs must be positive");
        }
        if self.reconnect_backoff_secs == 0 {
            return invalid("reconnect_backoff_secs must be positive");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive");
        }
        if self.frame_size == 0 {
            return invalid("frame_size must be positive");
        }
        if self.extraction_timeout_secs == 0 {
            return invalid("extraction_timeout_secs must be positive");
        }
        if self.report_timeout_secs == 0 {
            return invalid("report_timeout_secs must be positive");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be positive");
        }
        if self.tls.cert.is_some() != self.tls.key.is_some() {
            return invalid("tls.cert and tls.key must be set together");
        }
        Ok(())
    }

    /// Heartbeat and reporter tick
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Re-registration backoff
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    /// Fetch-execute fallback poll
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-batch worker deadline
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Deadline for one outcome delivery
    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    /// Control-channel connect and registration deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Ingestion websocket URL, `wss` when TLS is configured
    pub fn ingestion_url(&self) -> String {
        let scheme = if self.tls.is_enabled() { "wss" } else { "ws" };
        format!("{scheme}://{}{}", self.ingestion_addr, self.ingestion_path)
    }

    /// Coordinator endpoint URI, `https` when TLS is configured
    pub fn coordinator_uri(&self) -> String {
        let scheme = if self.tls.is_enabled() { "https" } else { "http" };
        format!("{scheme}://{}", self.coordinator_addr)
    }
}
