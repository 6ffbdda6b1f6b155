//! Feature module - typed annotations attached to content

use serde::{Deserialize, Serialize};

/// Kind of feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Fixed-length float vector with a distance metric
    Embedding,
    /// Arbitrary structured value
    Metadata,
}

impl FeatureKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Embedding => "embedding",
            FeatureKind::Metadata => "metadata",
        }
    }
}

/// Distance metric for embeddings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Dot product
    Dot,
    /// Euclidean distance
    Euclidean,
}

impl Distance {
    /// Get the metric name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
            Distance::Euclidean => "euclidean",
        }
    }
}

/// Embedding payload of a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Vector values
    pub values: Vec<f32>,
    /// Distance metric the vector is meant for
    pub distance: Distance,
}

/// A typed annotation attached to content
///
/// The `data` field holds the embedding (`{"values": [...], "distance": ...}`)
/// or the metadata value. Construct features with [`Feature::embedding`] and
/// [`Feature::metadata`] so `data` always matches `feature_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Kind of feature
    pub feature_type: FeatureKind,
    /// Feature name, used as the schema key
    pub name: String,
    /// Feature payload
    pub data: serde_json::Value,
}

impl Feature {
    /// Create an embedding feature
    pub fn embedding(name: impl Into<String>, values: Vec<f32>, distance: Distance) -> Self {
        let data = serde_json::json!({
            "values": values,
            "distance": distance.as_str(),
        });
        Self {
            feature_type: FeatureKind::Embedding,
            name: name.into(),
            data,
        }
    }

    /// Create a metadata feature
    pub fn metadata(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            feature_type: FeatureKind::Metadata,
            name: name.into(),
            data: value,
        }
    }

    /// Decode the embedding payload, if this is a well-formed embedding feature
    pub fn as_embedding(&self) -> Option<Embedding> {
        match self.feature_type {
            FeatureKind::Embedding => serde_json::from_value(self.data.clone()).ok(),
            FeatureKind::Metadata => None,
        }
    }
}
