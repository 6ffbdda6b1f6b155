//! Worker command implementation.

use crate::cli::CatalogArgs;
use crate::commands::load_registry;
use crate::error::Result;
use siphon_extractor::run_stdio;

/// Serve worker requests on stdin/stdout until the agent closes the pipe.
///
/// Runs without an async runtime; stdout carries only protocol lines.
pub fn execute_worker(args: CatalogArgs) -> Result<()> {
    let (_, registry) = load_registry(args.catalog.as_deref())?;
    run_stdio(registry)?;
    Ok(())
}
