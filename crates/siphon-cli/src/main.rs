//! Siphon CLI - field agent for pluggable content extraction.

use anyhow::Context;
use clap::Parser;
use siphon_cli::commands;
use siphon_cli::{init_tracing, Cli, Command, Formatter};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let formatter = Formatter::new(cli.format.into(), !cli.no_color);

    match cli.command {
        // Workers speak on stdout and need no runtime
        Command::Worker(args) => {
            init_tracing("warn");
            commands::execute_worker(args)?;
        }
        Command::List(args) => {
            init_tracing("warn");
            commands::execute_list(args, &formatter)?;
        }
        Command::Join(args) => {
            let config = commands::join::resolve_config(&args)?;
            init_tracing(&config.log_level);
            runtime()?.block_on(commands::execute_join(config))?;
        }
        Command::Describe(args) => {
            init_tracing("warn");
            runtime()?.block_on(commands::execute_describe(args))?;
        }
        Command::Extract(args) => {
            init_tracing("warn");
            runtime()?.block_on(commands::execute_extract(args, &formatter))?;
        }
    }

    Ok(())
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
