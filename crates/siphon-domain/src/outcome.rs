//! Outcome module - the recorded result of running a task

use crate::content::{Content, Extracted};
use crate::feature::Feature;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Outcome tag of a finished task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Extraction ran and produced outputs
    Success,
    /// Fetch, extraction or reporting failed
    Failed,
}

impl TaskOutcome {
    /// Get the outcome tag as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "Success",
            TaskOutcome::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished task awaiting delivery to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    /// Task this outcome belongs to
    pub task_id: TaskId,

    /// Success or failure
    pub outcome: TaskOutcome,

    /// Produced content, in extractor order
    pub content: Vec<Content>,

    /// Produced standalone features, in extractor order
    pub features: Vec<Feature>,
}

impl CompletedTask {
    /// A failed outcome carrying no outputs
    pub fn failed(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            outcome: TaskOutcome::Failed,
            content: Vec::new(),
            features: Vec::new(),
        }
    }

    /// A successful outcome, splitting extractor outputs into content and features
    pub fn from_extracted(task_id: impl Into<TaskId>, outputs: Vec<Extracted>) -> Self {
        let mut content = Vec::new();
        let mut features = Vec::new();
        for output in outputs {
            match output {
                Extracted::Content(c) => content.push(c),
                Extracted::Feature(f) => features.push(f),
            }
        }
        Self {
            task_id: task_id.into(),
            outcome: TaskOutcome::Success,
            content,
            features,
        }
    }

    /// Whether this outcome is a failure
    pub fn is_failed(&self) -> bool {
        self.outcome == TaskOutcome::Failed
    }

    /// Mark the outcome as failed, keeping any produced outputs
    pub fn mark_failed(&mut self) {
        self.outcome = TaskOutcome::Failed;
    }
}
