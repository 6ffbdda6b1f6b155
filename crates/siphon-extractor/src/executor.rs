//! Extraction executor interface
//!
//! The agent hands batches of fetched content to an [`ExtractionExecutor`].
//! Items are grouped by extractor name and each group becomes exactly one
//! extractor call, so a loaded extractor never sees two batches at once.

use crate::error::ExtractorError;
use async_trait::async_trait;
use siphon_domain::{Content, Extracted, ExtractionInput, ExtractorDescription, TaskId};
use std::collections::{BTreeMap, HashMap};

/// One task's worth of extraction input
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionItem {
    /// Task the outputs belong to
    pub task_id: TaskId,
    /// Extractor to run
    pub extractor: String,
    /// Fetched input content
    pub content: Content,
    /// Serialized parameters
    pub params: Option<String>,
}

/// Per-task extraction results
pub type BatchOutputs = HashMap<TaskId, Result<Vec<Extracted>, ExtractorError>>;

/// Items sharing one extractor, in submission order
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorGroup {
    /// Task ids, aligned with `inputs`
    pub task_ids: Vec<TaskId>,
    /// Extractor inputs
    pub inputs: Vec<ExtractionInput>,
}

/// Group items by extractor name
pub fn group_by_extractor(items: Vec<ExtractionItem>) -> BTreeMap<String, ExtractorGroup> {
    let mut groups: BTreeMap<String, ExtractorGroup> = BTreeMap::new();
    for item in items {
        let group = groups.entry(item.extractor).or_insert_with(|| ExtractorGroup {
            task_ids: Vec::new(),
            inputs: Vec::new(),
        });
        group.task_ids.push(item.task_id);
        group.inputs.push(ExtractionInput::new(item.content, item.params));
    }
    groups
}

/// Runs extraction off the agent's control loops
#[async_trait]
pub trait ExtractionExecutor: Send + Sync {
    /// Run every item, returning one result per task id
    ///
    /// Never fails as a whole: a missing extractor, a crash or a timeout
    /// fails the affected tasks only.
    async fn extract_batch(&self, items: Vec<ExtractionItem>) -> BatchOutputs;

    /// Describe an extractor, with schemas derived from a sample run
    async fn describe(&self, extractor: &str) -> Result<ExtractorDescription, ExtractorError>;

    /// Run a single extraction outside any task
    async fn extract_one(
        &self,
        extractor: &str,
        content: Content,
        params: Option<String>,
    ) -> Result<Vec<Extracted>, ExtractorError> {
        const ID: &str = "adhoc";
        let item = ExtractionItem {
            task_id: ID.to_string(),
            extractor: extractor.to_string(),
            content,
            params,
        };
        self.extract_batch(vec![item])
            .await
            .remove(ID)
            .unwrap_or_else(|| Err(ExtractorError::Worker("no result returned".to_string())))
    }

    /// Stop any worker processes
    async fn shutdown(&self) {}
}

/// Pair a group's task ids with its results
///
/// Missing results (a short answer) fail the remaining tasks.
pub(crate) fn zip_results(
    task_ids: Vec<TaskId>,
    results: Vec<Result<Vec<Extracted>, ExtractorError>>,
    out: &mut BatchOutputs,
) {
    let mut results = results.into_iter();
    for task_id in task_ids {
        let result = results
            .next()
            .unwrap_or_else(|| Err(ExtractorError::Worker("missing result".to_string())));
        out.insert(task_id, result);
    }
}
