//! Content module - byte payloads flowing into and out of extractors

use crate::feature::Feature;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A byte payload plus MIME type, features and labels
///
/// Content is a value: it is never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// MIME type of `data`
    pub content_type: String,

    /// Raw bytes
    #[serde(rename = "bytes")]
    pub data: Vec<u8>,

    /// Features attached to this content, in order
    #[serde(default)]
    pub features: Vec<Feature>,

    /// Key-value labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Content {
    /// Create content from raw bytes
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
            features: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Create `text/plain` content from a string
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new("text/plain", text.into().into_bytes())
    }

    /// Attach features
    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Attach labels
    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One item produced by an extractor
///
/// Extractors either derive new content (chunks, transcripts, pages) or
/// annotate the input with standalone features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extracted {
    /// Newly produced content
    Content(Content),
    /// Standalone feature describing the input content
    Feature(Feature),
}

impl From<Content> for Extracted {
    fn from(content: Content) -> Self {
        Extracted::Content(content)
    }
}

impl From<Feature> for Extracted {
    fn from(feature: Feature) -> Self {
        Extracted::Feature(feature)
    }
}
