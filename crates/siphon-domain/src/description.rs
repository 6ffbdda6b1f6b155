//! Extractor self-description advertised to the coordinator

use crate::content::Extracted;
use crate::feature::{Distance, Feature, FeatureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape of an embedding an extractor produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSchema {
    /// Vector dimension
    pub dim: usize,
    /// Distance metric
    pub distance: Distance,
}

/// Static description of an extractor
///
/// Schemas are keyed by feature name. They are usually not written by hand:
/// [`ExtractorDescription::with_schemas_from`] derives them from a sample run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorDescription {
    /// Extractor name, unique within an agent
    pub name: String,

    /// Version string
    pub version: String,

    /// Human-readable summary
    pub description: String,

    /// JSON schema of accepted parameters, if the extractor takes any
    #[serde(default)]
    pub input_params: Option<serde_json::Value>,

    /// MIME types the extractor accepts
    pub input_mime_types: Vec<String>,

    /// Embedding outputs by feature name
    #[serde(default)]
    pub embedding_schemas: BTreeMap<String, EmbeddingSchema>,

    /// Metadata outputs by feature name, as JSON schemas
    #[serde(default)]
    pub metadata_schemas: BTreeMap<String, serde_json::Value>,
}

impl ExtractorDescription {
    /// Create a description with no output schemas
    pub fn new(name: impl Into<String>, version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            input_params: None,
            input_mime_types: vec!["text/plain".to_string()],
            embedding_schemas: BTreeMap::new(),
            metadata_schemas: BTreeMap::new(),
        }
    }

    /// Set accepted MIME types
    pub fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.input_mime_types = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Set the parameter schema
    pub fn with_input_params(mut self, schema: serde_json::Value) -> Self {
        self.input_params = Some(schema);
        self
    }

    /// Record output schemas for every feature found in `outputs`
    ///
    /// Features attached to produced content count as well as standalone
    /// features. Malformed embeddings are skipped.
    pub fn with_schemas_from(mut self, outputs: &[Extracted]) -> Self {
        for output in outputs {
            match output {
                Extracted::Content(content) => {
                    for feature in &content.features {
                        self.record(feature);
                    }
                }
                Extracted::Feature(feature) => self.record(feature),
            }
        }
        self
    }

    fn record(&mut self, feature: &Feature) {
        match feature.feature_type {
            FeatureKind::Embedding => {
                if let Some(embedding) = feature.as_embedding() {
                    self.embedding_schemas.insert(
                        feature.name.clone(),
                        EmbeddingSchema {
                            dim: embedding.values.len(),
                            distance: embedding.distance,
                        },
                    );
                }
            }
            FeatureKind::Metadata => {
                self.metadata_schemas
                    .insert(feature.name.clone(), infer_schema(&feature.data));
            }
        }
    }
}

/// Infer a JSON schema describing `value`
pub fn infer_schema(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::{json, Value};

    match value {
        Value::Null => json!({"type": "null"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({"type": "integer"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::String(_) => json!({"type": "string"}),
        Value::Array(items) => match items.first() {
            Some(first) => json!({"type": "array", "items": infer_schema(first)}),
            None => json!({"type": "array"}),
        },
        Value::Object(map) => {
            let properties: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), infer_schema(v)))
                .collect();
            let required: Vec<&String> = map.keys().collect();
            json!({"type": "object", "properties": properties, "required": required})
        }
    }
}
