//! Ingestion wire messages
//!
//! One websocket connection carries one task's outcome as a strict sequence
//! of JSON text frames, each an externally tagged object such as
//! `{"BeginMultipartContent": {"id": 1}}`:
//!
//! ```text
//! BeginExtractedContentIngest
//! ( BeginMultipartContent
//!   MultipartContentFrame*        bytes, at most frame_size each
//!   MultipartContentFeature*      embedding features of this content
//!   FinishMultipartContent )*     MIME type, other features, labels
//! ExtractedFeatures*              one per standalone feature
//! FinishExtractedContentIngest
//! ```
//!
//! Content and features are only streamed for `Success` outcomes.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use siphon_domain::{CompletedTask, Content, Feature, Task, TaskOutcome};
use std::collections::HashMap;

/// Header of one task's report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginIngest {
    /// Task being reported
    pub task_id: String,
    /// Namespace of the task
    pub namespace: String,
    /// Output name to index table routing
    pub output_to_index_table_mapping: HashMap<String, String>,
    /// Content the task extracted from
    pub parent_content_id: String,
    /// Reporting agent
    pub executor_id: String,
    /// Outcome tag
    pub task_outcome: TaskOutcome,
    /// Extraction policy of the task
    pub extraction_policy: String,
    /// Extractor that ran
    pub extractor: String,
}

/// A message on the ingestion channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestMessage {
    /// Opens a task report
    BeginExtractedContentIngest(BeginIngest),

    /// Opens one produced content item
    BeginMultipartContent {
        /// Position of the item in this report, from 1
        id: u64,
    },

    /// A slice of the content bytes
    MultipartContentFrame {
        /// Raw bytes, encoded as a JSON array of numbers
        bytes: Vec<u8>,
    },

    /// An embedding attached to the open content item
    MultipartContentFeature {
        /// Feature name
        name: String,
        /// Vector values
        values: Vec<f32>,
    },

    /// Closes the open content item
    FinishMultipartContent {
        /// MIME type
        content_type: String,
        /// Non-embedding features of the item
        features: Vec<Feature>,
        /// Labels of the item
        labels: HashMap<String, String>,
    },

    /// A standalone feature of the parent content
    ExtractedFeatures {
        /// Parent content id
        content_id: String,
        /// Features, one per message
        features: Vec<Feature>,
    },

    /// Closes the task report
    FinishExtractedContentIngest {
        /// Number of content items sent
        num_extracted_content: u64,
    },
}

fn content_messages(id: u64, content: &Content, frame_size: usize, out: &mut Vec<IngestMessage>) {
    out.push(IngestMessage::BeginMultipartContent { id });
    for chunk in content.data.chunks(frame_size.max(1)) {
        out.push(IngestMessage::MultipartContentFrame { bytes: chunk.to_vec() });
    }

    let mut features = Vec::new();
    for feature in &content.features {
        match feature.as_embedding() {
            Some(embedding) => out.push(IngestMessage::MultipartContentFeature {
                name: feature.name.clone(),
                values: embedding.values,
            }),
            None => features.push(feature.clone()),
        }
    }

    out.push(IngestMessage::FinishMultipartContent {
        content_type: content.content_type.clone(),
        features,
        labels: content.labels.clone(),
    });
}

/// Build the full message sequence reporting `outcome` for `task`
pub fn ingest_messages(task: &Task, outcome: &CompletedTask, executor_id: &str, frame_size: usize) -> Vec<IngestMessage> {
    let mut out = vec![IngestMessage::BeginExtractedContentIngest(BeginIngest {
        task_id: outcome.task_id.clone(),
        namespace: task.namespace.clone(),
        output_to_index_table_mapping: task.output_index_mapping.clone(),
        parent_content_id: task.content.id.clone(),
        executor_id: executor_id.to_string(),
        task_outcome: outcome.outcome,
        extraction_policy: task.extraction_policy.clone(),
        extractor: task.extractor.clone(),
    })];

    let num_extracted_content = match outcome.outcome {
        TaskOutcome::Success => {
            for (i, content) in outcome.content.iter().enumerate() {
                content_messages(i as u64 + 1, content, frame_size, &mut out);
            }
            for feature in &outcome.features {
                out.push(IngestMessage::ExtractedFeatures {
                    content_id: task.content.id.clone(),
                    features: vec![feature.clone()],
                });
            }
            outcome.content.len() as u64
        }
        TaskOutcome::Failed => 0,
    };

    out.push(IngestMessage::FinishExtractedContentIngest { num_extracted_content });
    out
}

/// Interpret the acknowledgement text frame
pub fn parse_ack(text: &str) -> Result<(), ReportError> {
    let ack: serde_json::Value = serde_json::from_str(text)?;
    match ack.get("Error") {
        Some(serde_json::Value::String(message)) => Err(ReportError::Rejected(message.clone())),
        Some(other) => Err(ReportError::Rejected(other.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use siphon_domain::{ContentRef, Distance, Extracted};

    fn task() -> Task {
        Task {
            id: "test_task_id".to_string(),
            extractor: "test_extractor".to_string(),
            namespace: "test_namespace".to_string(),
            content: ContentRef {
                id: "test_content_id".to_string(),
                storage_url: "file:///tmp/in".to_string(),
                mime: "text/plain".to_string(),
                labels: HashMap::new(),
            },
            input_params: None,
            output_index_mapping: HashMap::from([
                ("output1".to_string(), "index_table1".to_string()),
                ("output2".to_string(), "index_table2".to_string()),
            ]),
            extraction_policy: "test_extraction_policy".to_string(),
        }
    }

    fn outcome() -> CompletedTask {
        let features = vec![
            Feature::embedding("name1", vec![1.0, 2.0, 3.0], Distance::Cosine),
            Feature::metadata("name2", json!({"a": 1, "b": "foo"})),
            Feature::embedding("name3", vec![4.0, 5.0, 6.0], Distance::Cosine),
        ];
        let content1 = Content::new("type1", vec![1, 2, 3, 4, 5, 6, 7])
            .with_features(features.clone())
            .with_labels(HashMap::from([("label1".to_string(), "value1".to_string())]));
        let content2 = Content::new("type2", vec![4, 5, 6, 7, 8, 9])
            .with_features(features.clone())
            .with_labels(HashMap::from([("label2".to_string(), "value2".to_string())]));

        CompletedTask::from_extracted(
            "test_task_id",
            vec![
                Extracted::Content(content1),
                Extracted::Content(content2),
                Extracted::Feature(features[0].clone()),
                Extracted::Feature(features[1].clone()),
            ],
        )
    }

    #[test]
    fn test_message_sequence() {
        let messages = ingest_messages(&task(), &outcome(), "test_executor_id", 2);

        // begin + (begin, 4 frames, 2 embeddings, finish) + (begin, 3 frames, 2 embeddings, finish) + 2 features + finish
        assert_eq!(messages.len(), 1 + 8 + 7 + 2 + 1);

        match &messages[0] {
            IngestMessage::BeginExtractedContentIngest(begin) => {
                assert_eq!(begin.parent_content_id, "test_content_id");
                assert_eq!(begin.task_outcome, TaskOutcome::Success);
                assert_eq!(begin.extractor, "test_extractor");
            }
            other => panic!("unexpected first message {other:?}"),
        }
        assert_eq!(messages[1], IngestMessage::BeginMultipartContent { id: 1 });
        assert_eq!(messages[2], IngestMessage::MultipartContentFrame { bytes: vec![1, 2] });
        assert_eq!(messages[5], IngestMessage::MultipartContentFrame { bytes: vec![7] });
        assert_eq!(
            messages[6],
            IngestMessage::MultipartContentFeature {
                name: "name1".to_string(),
                values: vec![1.0, 2.0, 3.0]
            }
        );
        match &messages[8] {
            IngestMessage::FinishMultipartContent { content_type, features, .. } => {
                assert_eq!(content_type, "type1");
                assert_eq!(features.len(), 1);
                assert_eq!(features[0].name, "name2");
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(messages[9], IngestMessage::BeginMultipartContent { id: 2 });
        assert!(matches!(
            &messages[16],
            IngestMessage::ExtractedFeatures { content_id, features } if content_id == "test_content_id" && features.len() == 1
        ));
        assert_eq!(
            messages[18],
            IngestMessage::FinishExtractedContentIngest { num_extracted_content: 2 }
        );
    }

    #[test]
    fn test_failed_outcome_sends_no_content() {
        let mut failed = outcome();
        failed.mark_failed();

        let messages = ingest_messages(&task(), &failed, "e", 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            IngestMessage::FinishExtractedContentIngest { num_extracted_content: 0 }
        );
    }

    #[test]
    fn test_wire_shape() {
        let frame = serde_json::to_value(IngestMessage::MultipartContentFrame { bytes: vec![1, 2] }).unwrap();
        assert_eq!(frame, json!({"MultipartContentFrame": {"bytes": [1, 2]}}));

        let begin = serde_json::to_value(&ingest_messages(&task(), &outcome(), "e", 2)[0]).unwrap();
        assert_eq!(begin["BeginExtractedContentIngest"]["task_outcome"], "Success");
        assert_eq!(
            begin["BeginExtractedContentIngest"]["output_to_index_table_mapping"]["output1"],
            "index_table1"
        );

        let feature = serde_json::to_value(&ingest_messages(&task(), &outcome(), "e", 2)[16]).unwrap();
        assert_eq!(feature["ExtractedFeatures"]["features"][0]["feature_type"], "embedding");
    }

    #[test]
    fn test_parse_ack() {
        assert!(parse_ack(r#"{"status": "ok"}"#).is_ok());
        assert!(parse_ack("{}").is_ok());
        assert!(matches!(
            parse_ack(r#"{"Error": "unknown task"}"#),
            Err(ReportError::Rejected(m)) if m == "unknown task"
        ));
        assert!(matches!(parse_ack("not json"), Err(ReportError::Json(_))));
    }
}
