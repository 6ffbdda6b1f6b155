//! In-process executor
//!
//! Runs extractors on the blocking thread pool of the current runtime. Used
//! by `siphon extract` and tests; a crashing extractor here can take the
//! process with it, so the agent uses [`crate::ProcessPool`] instead.

use crate::error::ExtractorError;
use crate::executor::{group_by_extractor, zip_results, BatchOutputs, ExtractionExecutor, ExtractionItem};
use crate::registry::ExtractorRegistry;
use crate::worker::WorkerState;
use async_trait::async_trait;
use siphon_domain::ExtractorDescription;
use std::sync::{Arc, Mutex, PoisonError};

/// Executor that extracts in the current process
#[derive(Debug, Clone)]
pub struct InlineExecutor {
    state: Arc<Mutex<WorkerState>>,
}

impl InlineExecutor {
    /// Create an executor over `registry`
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkerState::new(registry))),
        }
    }
}

#[async_trait]
impl ExtractionExecutor for InlineExecutor {
    async fn extract_batch(&self, items: Vec<ExtractionItem>) -> BatchOutputs {
        let groups = group_by_extractor(items);
        let state = Arc::clone(&self.state);

        let task_ids: Vec<String> = groups.values().flat_map(|g| g.task_ids.clone()).collect();
        let joined = tokio::task::spawn_blocking(move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut out = BatchOutputs::new();
            for (extractor, group) in groups {
                match state.extract(&extractor, &group.inputs) {
                    Ok(results) => zip_results(group.task_ids, results, &mut out),
                    Err(e) => {
                        let message = e.to_string();
                        let unknown = matches!(e, ExtractorError::UnknownExtractor(_));
                        for task_id in group.task_ids {
                            let err = if unknown {
                                ExtractorError::UnknownExtractor(extractor.clone())
                            } else {
                                ExtractorError::Worker(message.clone())
                            };
                            out.insert(task_id, Err(err));
                        }
                    }
                }
            }
            out
        })
        .await;

        joined.unwrap_or_else(|e| {
            task_ids
                .into_iter()
                .map(|id| (id, Err(ExtractorError::Panicked(e.to_string()))))
                .collect()
        })
    }

    async fn describe(&self, extractor: &str) -> Result<ExtractorDescription, ExtractorError> {
        let state = Arc::clone(&self.state);
        let name = extractor.to_string();
        tokio::task::spawn_blocking(move || {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .describe(&name)
        })
        .await
        .map_err(|e| ExtractorError::Panicked(e.to_string()))?
    }
}
