//! Task module - units of work assigned by the coordinator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a task, assigned by the coordinator
pub type TaskId = String;

/// Reference to the content item a task operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Content identifier at the coordinator (parent of any produced content)
    pub id: String,

    /// Where the bytes live: `file://`, `s3://`, `gs://`, `az://`, `http(s)://`
    pub storage_url: String,

    /// MIME type of the stored bytes
    pub mime: String,

    /// Key-value labels attached to the content
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A unit of assigned extraction work
///
/// Tasks are immutable once assigned. The task store owns them from the
/// moment the heartbeat stream delivers them until their outcome is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Name of the extractor to invoke
    pub extractor: String,

    /// Namespace the content belongs to
    pub namespace: String,

    /// Input content reference
    pub content: ContentRef,

    /// Serialized extractor parameters (JSON), if any
    #[serde(default)]
    pub input_params: Option<String>,

    /// Output name to downstream index table routing
    #[serde(default)]
    pub output_index_mapping: HashMap<String, String>,

    /// Extraction policy that produced this task
    #[serde(default)]
    pub extraction_policy: String,
}

impl Task {
    /// Parameters to hand to the extractor, treating a blank blob as absent
    pub fn params(&self) -> Option<&str> {
        self.input_params
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_params(params: Option<&str>) -> Task {
        Task {
            id: "t1".to_string(),
            extractor: "echo".to_string(),
            namespace: "default".to_string(),
            content: ContentRef {
                id: "c1".to_string(),
                storage_url: "file:///tmp/a.txt".to_string(),
                mime: "text/plain".to_string(),
                labels: HashMap::new(),
            },
            input_params: params.map(str::to_string),
            output_index_mapping: HashMap::new(),
            extraction_policy: "policy".to_string(),
        }
    }

    #[test]
    fn test_params_present() {
        let task = task_with_params(Some(r#"{"chunk_size": 10}"#));
        assert_eq!(task.params(), Some(r#"{"chunk_size": 10}"#));
    }

    #[test]
    fn test_blank_params_are_absent() {
        assert_eq!(task_with_params(Some("  ")).params(), None);
        assert_eq!(task_with_params(None).params(), None);
    }
}
