//! Worker wire protocol
//!
//! The agent talks to worker processes over their stdin/stdout with
//! newline-delimited JSON, one request and one response per line.
//!
//! **Request:**
//! ```json
//! {"op": "extract", "extractor": "chunker", "inputs": [{"content": {...}, "params": null}]}
//! {"op": "describe", "extractor": "chunker"}
//! ```
//!
//! **Response:**
//! ```json
//! {"status": "extracted", "results": [{"status": "ok", "outputs": [...]}]}
//! {"status": "described", "description": {...}}
//! {"status": "failed", "error": {"kind": "unknown_extractor", "message": "model-x"}}
//! ```
//!
//! Content bytes travel base64-encoded.

use crate::error::ExtractorError;
use serde::{Deserialize, Serialize};
use siphon_domain::{Content, Extracted, ExtractionError, ExtractionInput, ExtractorDescription, Feature};
use std::collections::HashMap;

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Content as carried between agent and worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireContent {
    /// MIME type
    pub content_type: String,
    /// Base64-encoded payload
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// Attached features
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl From<Content> for WireContent {
    fn from(content: Content) -> Self {
        Self {
            content_type: content.content_type,
            bytes: content.data,
            features: content.features,
            labels: content.labels,
        }
    }
}

impl From<WireContent> for Content {
    fn from(wire: WireContent) -> Self {
        Content::new(wire.content_type, wire.bytes)
            .with_features(wire.features)
            .with_labels(wire.labels)
    }
}

/// One extractor input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireInput {
    /// Input content
    pub content: WireContent,
    /// Serialized parameters
    #[serde(default)]
    pub params: Option<String>,
}

impl From<ExtractionInput> for WireInput {
    fn from(input: ExtractionInput) -> Self {
        Self {
            content: input.content.into(),
            params: input.params,
        }
    }
}

impl From<WireInput> for ExtractionInput {
    fn from(wire: WireInput) -> Self {
        ExtractionInput::new(wire.content.into(), wire.params)
    }
}

/// One extractor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireExtracted {
    /// Produced content
    Content(WireContent),
    /// Standalone feature
    Feature(Feature),
}

impl From<Extracted> for WireExtracted {
    fn from(extracted: Extracted) -> Self {
        match extracted {
            Extracted::Content(c) => WireExtracted::Content(c.into()),
            Extracted::Feature(f) => WireExtracted::Feature(f),
        }
    }
}

impl From<WireExtracted> for Extracted {
    fn from(wire: WireExtracted) -> Self {
        match wire {
            WireExtracted::Content(c) => Extracted::Content(c.into()),
            WireExtracted::Feature(f) => Extracted::Feature(f),
        }
    }
}

/// Error as carried across the process boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum WireError {
    /// Extractor name not in the worker's registry
    UnknownExtractor(String),
    /// Bad parameters
    InvalidParams(String),
    /// Unsupported input
    UnsupportedInput(String),
    /// Extractor returned an error
    Failed(String),
    /// Extractor panicked
    Panicked(String),
    /// Anything else
    Other(String),
}

impl From<&ExtractorError> for WireError {
    fn from(error: &ExtractorError) -> Self {
        match error {
            ExtractorError::UnknownExtractor(name) => WireError::UnknownExtractor(name.clone()),
            ExtractorError::Extraction(ExtractionError::InvalidParams(m)) => WireError::InvalidParams(m.clone()),
            ExtractorError::Extraction(ExtractionError::UnsupportedInput(m)) => {
                WireError::UnsupportedInput(m.clone())
            }
            ExtractorError::Extraction(ExtractionError::Failed(m)) => WireError::Failed(m.clone()),
            ExtractorError::Panicked(m) => WireError::Panicked(m.clone()),
            other => WireError::Other(other.to_string()),
        }
    }
}

impl From<WireError> for ExtractorError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::UnknownExtractor(name) => ExtractorError::UnknownExtractor(name),
            WireError::InvalidParams(m) => ExtractionError::InvalidParams(m).into(),
            WireError::UnsupportedInput(m) => ExtractionError::UnsupportedInput(m).into(),
            WireError::Failed(m) => ExtractionError::Failed(m).into(),
            WireError::Panicked(m) => ExtractorError::Panicked(m),
            WireError::Other(m) => ExtractorError::Worker(m),
        }
    }
}

/// Per-input result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WireResult {
    /// Extraction succeeded
    Ok {
        /// Outputs in extractor order
        outputs: Vec<WireExtracted>,
    },
    /// Extraction failed for this input only
    Error {
        /// Failure cause
        error: WireError,
    },
}

impl From<Result<Vec<Extracted>, ExtractorError>> for WireResult {
    fn from(result: Result<Vec<Extracted>, ExtractorError>) -> Self {
        match result {
            Ok(outputs) => WireResult::Ok {
                outputs: outputs.into_iter().map(Into::into).collect(),
            },
            Err(e) => WireResult::Error { error: (&e).into() },
        }
    }
}

impl From<WireResult> for Result<Vec<Extracted>, ExtractorError> {
    fn from(wire: WireResult) -> Self {
        match wire {
            WireResult::Ok { outputs } => Ok(outputs.into_iter().map(Into::into).collect()),
            WireResult::Error { error } => Err(error.into()),
        }
    }
}

/// Request from agent to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Run one extractor over a batch
    Extract {
        /// Extractor name
        extractor: String,
        /// Inputs, answered in order
        inputs: Vec<WireInput>,
    },
    /// Describe one extractor
    Describe {
        /// Extractor name
        extractor: String,
    },
}

/// Response from worker to agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// One result per input, in request order
    Extracted {
        /// Per-input results
        results: Vec<WireResult>,
    },
    /// Description of the requested extractor
    Described {
        /// Description with schemas
        description: ExtractorDescription,
    },
    /// The whole request failed
    Failed {
        /// Failure cause
        error: WireError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = WorkerRequest::Extract {
            extractor: "echo".to_string(),
            inputs: vec![WireInput {
                content: Content::from_text("hi").into(),
                params: None,
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["op"], "extract");
        assert_eq!(value["inputs"][0]["content"]["bytes"], "aGk=");
    }

    #[test]
    fn test_response_decodes() {
        let line = json!({
            "status": "extracted",
            "results": [
                {"status": "ok", "outputs": [
                    {"type": "content", "content_type": "text/plain", "bytes": "aGk="}
                ]},
                {"status": "error", "error": {"kind": "invalid_params", "message": "bad"}}
            ]
        })
        .to_string();

        let response: WorkerResponse = serde_json::from_str(&line).unwrap();
        let WorkerResponse::Extracted { results } = response else {
            panic!("expected extracted");
        };
        let first: Result<Vec<Extracted>, ExtractorError> = results[0].clone().into();
        assert_eq!(first.unwrap(), vec![Extracted::Content(Content::from_text("hi"))]);

        let second: Result<Vec<Extracted>, ExtractorError> = results[1].clone().into();
        assert!(matches!(
            second,
            Err(ExtractorError::Extraction(ExtractionError::InvalidParams(_)))
        ));
    }

    #[test]
    fn test_unknown_extractor_survives_boundary() {
        let wire = WireError::from(&ExtractorError::UnknownExtractor("model-x".to_string()));
        let text = serde_json::to_string(&WorkerResponse::Failed { error: wire }).unwrap();
        let WorkerResponse::Failed { error } = serde_json::from_str(&text).unwrap() else {
            panic!("expected failed");
        };
        assert!(matches!(
            ExtractorError::from(error),
            ExtractorError::UnknownExtractor(name) if name == "model-x"
        ));
    }
}
