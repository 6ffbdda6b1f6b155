//! Siphon Extractor Runtime
//!
//! Everything between "this task wants extractor X" and "here are X's
//! outputs": the catalog naming installed extractors, the built-in
//! extractors, the registry that loads them, and the executors that run them.
//!
//! ## Execution Model
//!
//! ```text
//! agent ─> ExtractionExecutor::extract_batch
//!            ├─ InlineExecutor: WorkerState on the blocking pool
//!            └─ ProcessPool:    ndjson over stdin/stdout ─> `siphon worker` ─> WorkerState
//!                                                                              └─ ExtractorRegistry ─> builtin | exec:
//! ```
//!
//! Batches are grouped by extractor name and each group is one extractor
//! call. A failure (unknown extractor, panic, crash, timeout) fails the tasks
//! in the affected group and nothing else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod external;
pub mod inline;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod worker;

pub use catalog::{CatalogEntry, EntryPoint, ExtractorCatalog};
pub use error::ExtractorError;
pub use executor::{group_by_extractor, BatchOutputs, ExtractionExecutor, ExtractionItem, ExtractorGroup};
pub use external::ExecExtractor;
pub use inline::InlineExecutor;
pub use pool::{ProcessPool, WorkerCommand, DEFAULT_TIMEOUT_SECS};
pub use registry::{ExtractorRegistry, Loader};
pub use worker::{run_stdio, serve, WorkerState};
