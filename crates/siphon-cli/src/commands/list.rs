//! List command implementation.

use crate::cli::CatalogArgs;
use crate::error::Result;
use crate::output::Formatter;
use siphon_extractor::ExtractorCatalog;

/// Execute the list command.
pub fn execute_list(args: CatalogArgs, formatter: &Formatter) -> Result<()> {
    let catalog = ExtractorCatalog::load(args.catalog.as_deref())?;
    println!("{}", formatter.format_catalog(&catalog)?);
    Ok(())
}
