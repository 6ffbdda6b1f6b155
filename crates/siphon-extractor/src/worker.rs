//! Worker-side extraction state and request loop
//!
//! A worker owns one [`WorkerState`] for its whole lifetime. Extractors are
//! loaded on first use and cached, so model initialization happens once per
//! worker. Panics in extractor code are caught per input and reported as
//! that input's failure; the worker keeps serving.

use crate::error::ExtractorError;
use crate::protocol::{WireResult, WorkerRequest, WorkerResponse};
use crate::registry::ExtractorRegistry;
use siphon_domain::{Extracted, ExtractionInput, Extractor, ExtractorDescription};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Per-worker extractor cache
#[derive(Debug)]
pub struct WorkerState {
    registry: ExtractorRegistry,
    cache: HashMap<String, CachedExtractor>,
}

struct CachedExtractor(Box<dyn Extractor>);

impl std::fmt::Debug for CachedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CachedExtractor")
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WorkerState {
    /// Create a worker with an empty cache
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    /// Names of extractors loaded so far
    pub fn loaded(&self) -> Vec<&str> {
        self.cache.keys().map(String::as_str).collect()
    }

    fn extractor(&mut self, name: &str) -> Result<&dyn Extractor, ExtractorError> {
        if !self.cache.contains_key(name) {
            info!(extractor = name, "Loading extractor");
            let registry = &self.registry;
            let extractor = catch_unwind(AssertUnwindSafe(|| registry.load(name)))
                .map_err(|p| ExtractorError::Panicked(panic_message(p.as_ref())))??;
            self.cache.insert(name.to_string(), CachedExtractor(extractor));
        }
        self.cache
            .get(name)
            .map(|c| c.0.as_ref())
            .ok_or_else(|| ExtractorError::UnknownExtractor(name.to_string()))
    }

    /// Run `name` over `inputs`, one result per input in order
    ///
    /// Fails as a whole only when the extractor cannot be loaded.
    pub fn extract(
        &mut self,
        name: &str,
        inputs: &[ExtractionInput],
    ) -> Result<Vec<Result<Vec<Extracted>, ExtractorError>>, ExtractorError> {
        let extractor = self.extractor(name)?;
        debug!(extractor = name, inputs = inputs.len(), "Extracting batch");

        match catch_unwind(AssertUnwindSafe(|| extractor.extract_batch(inputs))) {
            Ok(results) if results.len() == inputs.len() => {
                Ok(results.into_iter().map(|r| r.map_err(Into::into)).collect())
            }
            Ok(results) => {
                let message = format!("returned {} results for {} inputs", results.len(), inputs.len());
                Ok(inputs
                    .iter()
                    .map(|_| Err(ExtractorError::Worker(message.clone())))
                    .collect())
            }
            Err(payload) => {
                // Rerun one by one so only the offending inputs fail
                warn!(extractor = name, panic = %panic_message(payload.as_ref()), "Batch panicked, isolating inputs");
                Ok(inputs
                    .iter()
                    .map(|input| {
                        catch_unwind(AssertUnwindSafe(|| {
                            extractor.extract(&input.content, input.params.as_deref())
                        }))
                        .map_err(|p| ExtractorError::Panicked(panic_message(p.as_ref())))
                        .and_then(|r| r.map_err(Into::into))
                    })
                    .collect())
            }
        }
    }

    /// Describe `name`, deriving schemas from its sample input
    ///
    /// The description carries the catalog name, which tasks refer to.
    pub fn describe(&mut self, name: &str) -> Result<ExtractorDescription, ExtractorError> {
        let extractor = self.extractor(name)?;
        let mut description = catch_unwind(AssertUnwindSafe(|| extractor.describe()))
            .map_err(|p| ExtractorError::Panicked(panic_message(p.as_ref())))??;
        description.name = name.to_string();
        Ok(description)
    }

    /// Answer one protocol request
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Extract { extractor, inputs } => {
                let inputs: Vec<ExtractionInput> = inputs.into_iter().map(Into::into).collect();
                match self.extract(&extractor, &inputs) {
                    Ok(results) => WorkerResponse::Extracted {
                        results: results.into_iter().map(WireResult::from).collect(),
                    },
                    Err(e) => WorkerResponse::Failed { error: (&e).into() },
                }
            }
            WorkerRequest::Describe { extractor } => match self.describe(&extractor) {
                Ok(description) => WorkerResponse::Described { description },
                Err(e) => WorkerResponse::Failed { error: (&e).into() },
            },
        }
    }
}

/// Serve newline-delimited requests from `reader` until end of input
///
/// Malformed lines get a `failed` response; the loop only stops on EOF or a
/// write error.
pub fn serve<R: BufRead, W: Write>(state: &mut WorkerState, reader: R, mut writer: W) -> Result<(), ExtractorError> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(request) => state.handle(request),
            Err(e) => {
                warn!(error = %e, "Malformed worker request");
                WorkerResponse::Failed {
                    error: (&ExtractorError::Json(e)).into(),
                }
            }
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}

/// Worker process entry point: serve stdin, answer on stdout
pub fn run_stdio(registry: ExtractorRegistry) -> Result<(), ExtractorError> {
    // Keep the default hook from printing panics caught per input twice
    std::panic::set_hook(Box::new(|info| {
        debug!(panic = %info, "Extractor panicked");
    }));

    let mut state = WorkerState::new(registry);
    info!(pid = std::process::id(), "Worker ready");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(&mut state, stdin.lock(), stdout.lock())
}
