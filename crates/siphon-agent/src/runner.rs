//! Fetch-execute loop
//!
//! Promotes pending tasks to running, fetches their content, hands the
//! fetched batch to the extraction executor and records one outcome per
//! task. Tasks whose fetch fails are completed as `Failed` right away and
//! never reach the executor.

use siphon_domain::{CompletedTask, Content, Task};
use siphon_extractor::{ExtractionExecutor, ExtractionItem};
use siphon_fetch::ContentFetcher;
use siphon_store::TaskStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

/// Runs assigned tasks against the executor
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<TaskStore>,
    fetcher: ContentFetcher,
    executor: Arc<dyn ExtractionExecutor>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner").finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Create a runner over the shared store
    pub fn new(store: Arc<TaskStore>, fetcher: ContentFetcher, executor: Arc<dyn ExtractionExecutor>) -> Self {
        Self {
            store,
            fetcher,
            executor,
        }
    }

    fn complete(&self, outcome: CompletedTask) {
        let task_id = outcome.task_id.clone();
        if let Err(e) = self.store.complete(outcome) {
            warn!(task_id = %task_id, error = %e, "Could not record outcome");
        }
    }

    /// Fail every task of a batch that died before finishing
    ///
    /// Tasks the batch already completed are left alone.
    fn fail_abandoned(&self, task_ids: Vec<String>) {
        for task_id in task_ids {
            if self.store.complete(CompletedTask::failed(task_id.clone())).is_ok() {
                warn!(task_id = %task_id, "Failed task from abandoned batch");
            }
        }
    }

    /// Fetch, extract and complete one batch of running tasks
    pub async fn process_batch(&self, tasks: Vec<Task>) {
        let urls: HashMap<_, _> = tasks
            .iter()
            .map(|t| (t.id.clone(), t.content.storage_url.clone()))
            .collect();
        let mut fetched = self.fetcher.fetch_all(urls).await;

        let mut items = Vec::with_capacity(tasks.len());
        for task in tasks {
            match fetched.remove(&task.id) {
                Some(Ok(bytes)) => {
                    let content = Content::new(task.content.mime.clone(), bytes).with_labels(task.content.labels.clone());
                    items.push(ExtractionItem {
                        params: task.params().map(str::to_string),
                        task_id: task.id,
                        extractor: task.extractor,
                        content,
                    });
                }
                Some(Err(e)) => {
                    warn!(task_id = %task.id, url = %task.content.storage_url, error = %e, "Failed to fetch content");
                    self.complete(CompletedTask::failed(task.id));
                }
                None => {
                    warn!(task_id = %task.id, "Fetcher returned no result");
                    self.complete(CompletedTask::failed(task.id));
                }
            }
        }

        if items.is_empty() {
            return;
        }

        debug!(items = items.len(), "Extracting batch");
        for (task_id, result) in self.executor.extract_batch(items).await {
            let outcome = match result {
                Ok(outputs) => {
                    info!(task_id = %task_id, outputs = outputs.len(), "Completed task");
                    CompletedTask::from_extracted(task_id, outputs)
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Extraction failed");
                    CompletedTask::failed(task_id)
                }
            };
            self.complete(outcome);
        }
    }

    /// Take every pending task and process it as one batch
    ///
    /// Returns the number of tasks taken.
    pub async fn run_once(&self) -> usize {
        let tasks = self.store.get_runnable_tasks();
        let count = tasks.len();
        if count > 0 {
            self.process_batch(tasks).await;
        }
        count
    }

    /// Start a batch whenever tasks arrive, until shutdown
    ///
    /// Batches run concurrently so a slow fetch or extraction does not hold
    /// back later assignments. Tasks of a batch that panics are failed.
    /// Shutdown aborts batches in flight.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut batches = JoinSet::new();
        let mut in_flight: HashMap<task::Id, Vec<String>> = HashMap::new();
        info!("Task runner started");

        loop {
            tokio::select! {
                _ = self.store.wait_for_tasks() => {}
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => break,
            }

            while let Some(joined) = batches.try_join_next_with_id() {
                match joined {
                    Ok((id, ())) => {
                        in_flight.remove(&id);
                    }
                    Err(e) => {
                        warn!(error = %e, "Batch task failed");
                        if let Some(task_ids) = in_flight.remove(&e.id()) {
                            self.fail_abandoned(task_ids);
                        }
                    }
                }
            }

            let tasks = self.store.get_runnable_tasks();
            if tasks.is_empty() {
                continue;
            }
            debug!(tasks = tasks.len(), "Starting batch");
            let task_ids = tasks.iter().map(|t| t.id.clone()).collect();
            let runner = self.clone();
            let handle = batches.spawn(async move { runner.process_batch(tasks).await });
            in_flight.insert(handle.id(), task_ids);
        }

        batches.abort_all();
        info!("Task runner stopped");
    }
}
