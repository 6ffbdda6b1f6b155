//! Describe command implementation.

use crate::cli::DescribeArgs;
use crate::commands::load_registry;
use crate::error::Result;
use siphon_extractor::{ExtractionExecutor, InlineExecutor};

/// Execute the describe command.
///
/// Always prints JSON: the description is what the coordinator receives.
pub async fn execute_describe(args: DescribeArgs) -> Result<()> {
    let (_, registry) = load_registry(args.catalog.catalog.as_deref())?;
    let executor = InlineExecutor::new(registry);

    let description = executor.describe(&args.extractor).await?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
