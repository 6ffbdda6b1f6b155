//! Join command implementation.

use crate::cli::JoinArgs;
use crate::commands::load_registry;
use crate::error::Result;
use siphon_agent::{shutdown_signal, Agent, AgentConfig};
use siphon_extractor::{ProcessPool, WorkerCommand};
use std::sync::Arc;
use tracing::info;

/// Load the agent configuration and apply command-line overrides.
pub fn resolve_config(args: &JoinArgs) -> Result<AgentConfig> {
    let mut config = AgentConfig::load(args.config.as_deref())?;

    if let Some(addr) = &args.coordinator_addr {
        config.coordinator_addr = addr.clone();
    }
    if let Some(addr) = &args.ingestion_addr {
        config.ingestion_addr = addr.clone();
    }
    if let Some(port) = args.listen_port {
        config.listen_port = port;
    }
    if let Some(addr) = &args.advertise_addr {
        config.advertise_addr = Some(addr.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(catalog) = &args.catalog {
        config.catalog_path = Some(catalog.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Execute the join command.
pub async fn execute_join(config: AgentConfig) -> Result<()> {
    let catalog_path = config.catalog_path.clone();
    let (catalog, mut registry) = load_registry(catalog_path.as_deref())?;

    let extractors: Vec<String> = if config.extractors.is_empty() {
        catalog.names().into_iter().map(str::to_string).collect()
    } else {
        registry.retain(&config.extractors)?;
        config.extractors.clone()
    };
    info!(
        catalog = ?catalog_path,
        workers = config.workers,
        extractors = registry.names().len(),
        "Extractor catalog loaded"
    );

    let command = WorkerCommand::current_exe(catalog_path.as_deref())?;
    let pool = ProcessPool::new(command, config.workers, config.extraction_timeout());

    Agent::new(config, Arc::new(pool), extractors)
        .run(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use std::io::Write;

    fn join_args(argv: &[&str]) -> JoinArgs {
        let mut full = vec!["siphon", "join"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Join(args) => args,
            _ => panic!("Expected Join command"),
        }
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
executor_id = "from-file"
coordinator_addr = "file-coord:8950"
workers = 2
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = resolve_config(&join_args(&["--config", path, "--workers", "8", "--listen-port", "9100"])).unwrap();

        assert_eq!(config.executor_id, "from-file");
        assert_eq!(config.coordinator_addr, "file-coord:8950");
        assert_eq!(config.workers, 8);
        assert_eq!(config.listen_port, 9100);
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve_config(&join_args(&["--advertise-addr", "10.1.2.3"])).unwrap();

        assert_eq!(config.advertise_addr.as_deref(), Some("10.1.2.3"));
        assert_eq!(config.workers, 1);
        assert!(!config.executor_id.is_empty());
    }

    #[test]
    fn test_invalid_override_rejected() {
        assert!(resolve_config(&join_args(&["--workers", "0"])).is_err());
    }
}
