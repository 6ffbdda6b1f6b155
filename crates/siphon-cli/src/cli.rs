//! CLI command definitions and argument parsing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Siphon - field agent for pluggable content extraction.
#[derive(Debug, Parser)]
#[command(name = "siphon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true, default_value = "table")]
    pub format: CliFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join a coordinator and run extraction tasks until stopped
    Join(JoinArgs),

    /// Worker process entry point
    #[command(hide = true)]
    Worker(CatalogArgs),

    /// Print an extractor's description
    Describe(DescribeArgs),

    /// Run an extractor locally and print its outputs
    Extract(ExtractArgs),

    /// List catalog entries
    List(CatalogArgs),
}

/// Arguments for the join command.
#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Agent configuration file (TOML)
    #[arg(short, long, env = "SIPHON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Coordinator address (host:port)
    #[arg(long, env = "SIPHON_COORDINATOR_ADDR")]
    pub coordinator_addr: Option<String>,

    /// Ingestion server address (host:port)
    #[arg(long, env = "SIPHON_INGESTION_ADDR")]
    pub ingestion_addr: Option<String>,

    /// Local extraction endpoint port
    #[arg(long, env = "SIPHON_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Address advertised to the coordinator
    #[arg(long, env = "SIPHON_ADVERTISE_ADDR")]
    pub advertise_addr: Option<String>,

    /// Number of extraction worker processes
    #[arg(long, env = "SIPHON_WORKERS")]
    pub workers: Option<usize>,

    /// Extractor catalog file
    #[arg(long, env = "SIPHON_CATALOG")]
    pub catalog: Option<PathBuf>,
}

/// Catalog selection shared by several commands.
#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Extractor catalog file; built-in extractors when omitted
    #[arg(long, env = "SIPHON_CATALOG")]
    pub catalog: Option<PathBuf>,
}

/// Arguments for the describe command.
#[derive(Debug, Args)]
pub struct DescribeArgs {
    /// Extractor name
    pub extractor: String,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

/// Arguments for the extract command.
#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Extractor name
    pub extractor: String,

    /// Inline text input
    #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
    pub text: Option<String>,

    /// Input file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// MIME type of the input
    #[arg(short, long)]
    pub mime: Option<String>,

    /// Extractor parameters (JSON)
    #[arg(short, long)]
    pub params: Option<String>,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

impl From<CliFormat> for crate::output::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::output::OutputFormat::Table,
            CliFormat::Json => crate::output::OutputFormat::Json,
        }
    }
}
