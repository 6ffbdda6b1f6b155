//! Compiled-in extractors
//!
//! Small, dependency-free extractors that let an agent run end to end
//! without external plugins:
//!
//! - `echo`: returns the input unchanged
//! - `chunker`: splits UTF-8 text into overlapping chunks
//! - `hash-embedding`: SHA-256 of the bytes as a 32-dimensional embedding
//! - `mime-metadata`: byte length, MIME type and label count

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use siphon_domain::{
    Content, Distance, Extracted, ExtractionError, ExtractionInput, Extractor, ExtractorDescription, Feature,
};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Names of every built-in extractor
pub const NAMES: &[&str] = &["echo", "chunker", "hash-embedding", "mime-metadata"];

/// Instantiate a built-in extractor by name
pub fn create(name: &str) -> Option<Box<dyn Extractor>> {
    match name {
        "echo" => Some(Box::new(EchoExtractor)),
        "chunker" => Some(Box::new(ChunkExtractor)),
        "hash-embedding" => Some(Box::new(HashEmbeddingExtractor)),
        "mime-metadata" => Some(Box::new(MimeMetadataExtractor)),
        _ => None,
    }
}

/// Parse JSON parameters, falling back to defaults when absent
pub fn parse_params<T: DeserializeOwned + Default>(params: Option<&str>) -> Result<T, ExtractionError> {
    match params.map(str::trim).filter(|p| !p.is_empty() && *p != "null") {
        None => Ok(T::default()),
        Some(p) => serde_json::from_str(p).map_err(|e| ExtractionError::InvalidParams(e.to_string())),
    }
}

fn text_of(content: &Content) -> Result<&str, ExtractionError> {
    std::str::from_utf8(&content.data)
        .map_err(|e| ExtractionError::UnsupportedInput(format!("content is not UTF-8: {e}")))
}

/// Returns its input unchanged
pub struct EchoExtractor;

impl Extractor for EchoExtractor {
    fn description(&self) -> ExtractorDescription {
        ExtractorDescription::new("echo", "0.1.0", "Returns the input content unchanged")
            .with_mime_types(&["*/*"])
    }

    fn sample_input(&self) -> ExtractionInput {
        ExtractionInput::new(Content::from_text("hello world"), None)
    }

    fn extract(&self, content: &Content, _params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError> {
        Ok(vec![Extracted::Content(content.clone())])
    }
}

/// Splitting strategy for [`ChunkExtractor`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSplitter {
    /// Split on paragraphs, then lines, then words, then characters
    #[default]
    Recursive,
    /// Split on paragraphs only
    Char,
}

/// Parameters of [`ChunkExtractor`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub overlap: usize,
    /// Splitting strategy
    pub text_splitter: TextSplitter,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            overlap: 0,
            text_splitter: TextSplitter::Recursive,
        }
    }
}

/// Splits text into chunks; each chunk keeps the input's features and labels
pub struct ChunkExtractor;

impl ChunkExtractor {
    /// Split `text` according to `params`
    pub fn split(text: &str, params: &ChunkParams) -> Result<Vec<String>, ExtractionError> {
        if params.chunk_size == 0 {
            return Err(ExtractionError::InvalidParams("chunk_size must be positive".to_string()));
        }
        if params.overlap >= params.chunk_size {
            return Err(ExtractionError::InvalidParams(
                "overlap must be smaller than chunk_size".to_string(),
            ));
        }
        let chunks = match params.text_splitter {
            TextSplitter::Recursive => split_recursive(text, &["\n\n", "\n", " ", ""], params),
            TextSplitter::Char => {
                let pieces: Vec<&str> = text.split("\n\n").filter(|p| !p.is_empty()).collect();
                merge_pieces(&pieces, "\n\n", params)
            }
        };
        Ok(chunks)
    }
}

impl Extractor for ChunkExtractor {
    fn description(&self) -> ExtractorDescription {
        ExtractorDescription::new("chunker", "0.1.0", "Splits text into smaller chunks").with_input_params(json!({
            "type": "object",
            "properties": {
                "chunk_size": {"type": "integer", "default": 100},
                "overlap": {"type": "integer", "default": 0},
                "text_splitter": {"type": "string", "enum": ["recursive", "char"], "default": "recursive"}
            },
            "additionalProperties": false
        }))
    }

    fn sample_input(&self) -> ExtractionInput {
        let content = Content::from_text("This is a test string to be split into chunks")
            .with_features(vec![Feature::metadata("metadata", json!({"filename": "test.txt"}))]);
        ExtractionInput::new(content, Some(r#"{"chunk_size": 5}"#.to_string()))
    }

    fn extract(&self, content: &Content, params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError> {
        let params: ChunkParams = parse_params(params)?;
        let chunks = Self::split(text_of(content)?, &params)?;
        Ok(chunks
            .into_iter()
            .map(|chunk| {
                Extracted::Content(
                    Content::from_text(chunk)
                        .with_features(content.features.clone())
                        .with_labels(content.labels.clone()),
                )
            })
            .collect())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], params: &ChunkParams) -> Vec<String> {
    // Empty separator always matches, so this never falls through
    let idx = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(idx).copied().unwrap_or("");
    let rest = separators.get(idx + 1..).unwrap_or(&[]);

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for piece in &pieces {
        if char_len(piece) <= params.chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, separator, params));
            fitting.clear();
        }
        if rest.is_empty() {
            out.push(piece.clone());
        } else {
            out.extend(split_recursive(piece, rest, params));
        }
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, separator, params));
    }
    out
}

/// Join pieces into chunks of at most `chunk_size` characters, carrying up to
/// `overlap` characters of trailing pieces into the next chunk
fn merge_pieces(pieces: &[&str], separator: &str, params: &ChunkParams) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    // Length of window joined with separators
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        let added = |window: &VecDeque<&str>| if window.is_empty() { len } else { len + sep_len };

        if total + added(&window) > params.chunk_size && !window.is_empty() {
            chunks.push(join(&window, separator));
            while !window.is_empty() && (total > params.overlap || total + added(&window) > params.chunk_size) {
                if let Some(first) = window.pop_front() {
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }
        }
        total += added(&window);
        window.push_back(piece);
    }
    if !window.is_empty() {
        chunks.push(join(&window, separator));
    }
    chunks
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator).trim().to_string()
}

/// Embeds content as its SHA-256 digest read as 32 signed bytes
///
/// Identical inputs map to identical vectors, which makes it a cheap
/// duplicate detector.
pub struct HashEmbeddingExtractor;

impl HashEmbeddingExtractor {
    /// Compute the embedding vector for `data`
    pub fn embed(data: &[u8]) -> Vec<f32> {
        Sha256::digest(data)
            .iter()
            .map(|b| f32::from(*b as i8))
            .collect()
    }
}

impl Extractor for HashEmbeddingExtractor {
    fn description(&self) -> ExtractorDescription {
        ExtractorDescription::new("hash-embedding", "0.1.0", "SHA-256 identity hash embedding")
            .with_mime_types(&["text/plain", "application/octet-stream"])
    }

    fn sample_input(&self) -> ExtractionInput {
        ExtractionInput::new(Content::from_text("hello world"), None)
    }

    fn extract(&self, content: &Content, _params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError> {
        let values = Self::embed(&content.data);
        Ok(vec![Extracted::Feature(Feature::embedding("embedding", values, Distance::Cosine))])
    }
}

/// Describes content by its size, MIME type and labels
pub struct MimeMetadataExtractor;

impl Extractor for MimeMetadataExtractor {
    fn description(&self) -> ExtractorDescription {
        ExtractorDescription::new("mime-metadata", "0.1.0", "Byte length, MIME type and label count")
            .with_mime_types(&["*/*"])
    }

    fn sample_input(&self) -> ExtractionInput {
        let content = Content::from_text("hello").with_labels(HashMap::from([(
            "source".to_string(),
            "sample".to_string(),
        )]));
        ExtractionInput::new(content, None)
    }

    fn extract(&self, content: &Content, _params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError> {
        let value = json!({
            "length": content.len(),
            "mime": content.content_type,
            "labels": content.labels.len(),
        });
        Ok(vec![Extracted::Feature(Feature::metadata("mime_metadata", value))])
    }
}
