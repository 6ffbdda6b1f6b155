//! Type conversions between proto and domain types

use crate::proto;
use siphon_domain::{ContentRef, Distance, EmbeddingSchema, ExtractorDescription, Task};

/// Error type for conversion failures
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Unknown distance metric
    #[error("Invalid distance metric: {0}")]
    InvalidDistance(String),

    /// Embedded JSON could not be parsed
    #[error("Invalid JSON in {field}: {source}")]
    InvalidJson {
        /// Field holding the JSON text
        field: &'static str,
        /// Parser error
        source: serde_json::Error,
    },
}

/// Parse a distance metric name
pub fn distance_from_str(s: &str) -> Result<Distance, ConversionError> {
    match s {
        "cosine" => Ok(Distance::Cosine),
        "dot" => Ok(Distance::Dot),
        "euclidean" => Ok(Distance::Euclidean),
        other => Err(ConversionError::InvalidDistance(other.to_string())),
    }
}

/// Convert a proto Task to a domain Task
pub fn task_from_proto(task: proto::Task) -> Result<Task, ConversionError> {
    if task.id.is_empty() {
        return Err(ConversionError::MissingField("id"));
    }
    let metadata = task
        .content_metadata
        .ok_or(ConversionError::MissingField("content_metadata"))?;

    Ok(Task {
        id: task.id,
        extractor: task.extractor,
        namespace: task.namespace,
        content: ContentRef {
            id: metadata.id,
            storage_url: metadata.storage_url,
            mime: metadata.mime,
            labels: metadata.labels,
        },
        input_params: Some(task.input_params).filter(|p| !p.is_empty()),
        output_index_mapping: task.output_index_mapping,
        extraction_policy: task.extraction_policy,
    })
}

/// Convert a domain Task to a proto Task
pub fn task_to_proto(task: &Task) -> proto::Task {
    proto::Task {
        id: task.id.clone(),
        extractor: task.extractor.clone(),
        namespace: task.namespace.clone(),
        content_metadata: Some(proto::ContentMetadata {
            id: task.content.id.clone(),
            storage_url: task.content.storage_url.clone(),
            mime: task.content.mime.clone(),
            labels: task.content.labels.clone(),
        }),
        input_params: task.input_params.clone().unwrap_or_default(),
        output_index_mapping: task.output_index_mapping.clone(),
        extraction_policy: task.extraction_policy.clone(),
    }
}

/// Convert a domain ExtractorDescription to a proto Extractor
pub fn description_to_proto(description: &ExtractorDescription) -> proto::Extractor {
    proto::Extractor {
        name: description.name.clone(),
        version: description.version.clone(),
        description: description.description.clone(),
        input_params: description
            .input_params
            .as_ref()
            .map(|schema| schema.to_string())
            .unwrap_or_default(),
        input_mime_types: description.input_mime_types.clone(),
        embedding_schemas: description
            .embedding_schemas
            .iter()
            .map(|(name, schema)| {
                (
                    name.clone(),
                    proto::EmbeddingSchema {
                        dim: schema.dim as u64,
                        distance: schema.distance.as_str().to_string(),
                    },
                )
            })
            .collect(),
        metadata_schemas: description
            .metadata_schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_string()))
            .collect(),
    }
}

/// Convert a proto Extractor to a domain ExtractorDescription
pub fn description_from_proto(extractor: proto::Extractor) -> Result<ExtractorDescription, ConversionError> {
    let input_params = if extractor.input_params.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&extractor.input_params).map_err(|source| {
                ConversionError::InvalidJson {
                    field: "input_params",
                    source,
                }
            })?,
        )
    };

    let mut embedding_schemas = std::collections::BTreeMap::new();
    for (name, schema) in extractor.embedding_schemas {
        embedding_schemas.insert(
            name,
            EmbeddingSchema {
                dim: schema.dim as usize,
                distance: distance_from_str(&schema.distance)?,
            },
        );
    }

    let mut metadata_schemas = std::collections::BTreeMap::new();
    for (name, schema) in extractor.metadata_schemas {
        let value = serde_json::from_str(&schema).map_err(|source| ConversionError::InvalidJson {
            field: "metadata_schemas",
            source,
        })?;
        metadata_schemas.insert(name, value);
    }

    Ok(ExtractorDescription {
        name: extractor.name,
        version: extractor.version,
        description: extractor.description,
        input_params,
        input_mime_types: extractor.input_mime_types,
        embedding_schemas,
        metadata_schemas,
    })
}
