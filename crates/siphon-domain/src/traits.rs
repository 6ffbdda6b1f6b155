//! Trait definitions for extraction plugins
//!
//! Every extractor, compiled-in or external, is driven through [`Extractor`].
//! Implementations live in siphon-extractor.

use crate::content::{Content, Extracted};
use crate::description::ExtractorDescription;

/// Error raised by extractor code for a single input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// Parameters could not be parsed or were out of range
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The input content is not something this extractor handles
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Extraction itself failed
    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// One input to an extractor: content plus serialized parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionInput {
    /// Content to extract from
    pub content: Content,
    /// Serialized JSON parameters, if any
    pub params: Option<String>,
}

impl ExtractionInput {
    /// Create an input
    pub fn new(content: Content, params: Option<String>) -> Self {
        Self { content, params }
    }
}

/// Capability interface of an extraction plugin
///
/// Instances are expensive to create (models, clients) and are cached by the
/// worker that loaded them. `extract` may be called repeatedly from one
/// thread; implementations never see two batches at once.
pub trait Extractor: Send + Sync {
    /// Static description (no output schemas)
    fn description(&self) -> ExtractorDescription;

    /// Representative input used to derive output schemas
    fn sample_input(&self) -> ExtractionInput;

    /// Extract from one input
    fn extract(&self, content: &Content, params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError>;

    /// Extract from a batch of inputs, one result per input in order
    ///
    /// The default runs [`Extractor::extract`] per input. Extractors that
    /// batch natively (model inference) override this.
    fn extract_batch(&self, inputs: &[ExtractionInput]) -> Vec<Result<Vec<Extracted>, ExtractionError>> {
        inputs
            .iter()
            .map(|input| self.extract(&input.content, input.params.as_deref()))
            .collect()
    }

    /// Full description with output schemas derived from a sample run
    fn describe(&self) -> Result<ExtractorDescription, ExtractionError> {
        let sample = self.sample_input();
        let outputs = self.extract(&sample.content, sample.params.as_deref())?;
        Ok(self.description().with_schemas_from(&outputs))
    }
}
