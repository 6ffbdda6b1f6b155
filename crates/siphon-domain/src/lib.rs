//! Siphon Domain Layer
//!
//! Core value types shared by every other Siphon crate: the tasks an agent
//! receives from the coordinator, the content it extracts from, the features
//! extractors attach, and the outcomes it reports.
//!
//! ## Key Concepts
//!
//! - **Task**: one unit of assigned extraction work, immutable once assigned
//! - **Content**: a byte payload with a MIME type, labels and features
//! - **Feature**: an embedding or metadata annotation attached to content
//! - **CompletedTask**: the recorded outcome of running a task
//! - **Extractor**: the capability interface every extraction plugin satisfies
//!
//! ## Architecture
//!
//! This crate holds no I/O. Transport (gRPC, websockets, worker processes)
//! lives in other crates and converts to and from these types at the edges.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content;
pub mod description;
pub mod feature;
pub mod outcome;
pub mod task;
pub mod traits;

// Re-exports for convenience
pub use content::{Content, Extracted};
pub use description::{EmbeddingSchema, ExtractorDescription};
pub use feature::{Distance, Embedding, Feature, FeatureKind};
pub use outcome::{CompletedTask, TaskOutcome};
pub use task::{ContentRef, Task, TaskId};
pub use traits::{ExtractionError, ExtractionInput, Extractor};
