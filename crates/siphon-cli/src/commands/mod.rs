//! Command implementations.

pub mod describe;
pub mod extract;
pub mod join;
pub mod list;
pub mod worker;

pub use self::describe::execute_describe;
pub use self::extract::execute_extract;
pub use self::join::execute_join;
pub use self::list::execute_list;
pub use self::worker::execute_worker;

use siphon_extractor::{ExtractorCatalog, ExtractorRegistry};
use std::path::Path;

/// Load the catalog at `path`, or the built-ins, and build its registry
pub(crate) fn load_registry(path: Option<&Path>) -> crate::Result<(ExtractorCatalog, ExtractorRegistry)> {
    let catalog = ExtractorCatalog::load(path)?;
    let registry = ExtractorRegistry::from_catalog(&catalog)?;
    Ok((catalog, registry))
}
