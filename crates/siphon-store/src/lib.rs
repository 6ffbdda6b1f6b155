//! Siphon Task Store
//!
//! In-memory state machine tracking every task from assignment to reporting.
//!
//! # Lifecycle
//!
//! ```text
//! Pending -> Running -> Finished(Success | Failed) -> (removed)
//! ```
//!
//! A task id lives in exactly one state at a time. Three loops share one
//! store: the heartbeat stream adds tasks, the runner moves them to running
//! and records outcomes, and the reporter drains finished outcomes. Every
//! public operation is one critical section, so no caller ever observes a
//! task in two states.
//!
//! # Examples
//!
//! ```
//! use siphon_domain::CompletedTask;
//! use siphon_store::TaskStore;
//! # use siphon_domain::{ContentRef, Task};
//! # let task = Task {
//! #     id: "t1".into(), extractor: "echo".into(), namespace: "ns".into(),
//! #     content: ContentRef { id: "c1".into(), storage_url: "file:///x".into(),
//! #         mime: "text/plain".into(), labels: Default::default() },
//! #     input_params: None, output_index_mapping: Default::default(),
//! #     extraction_policy: "p".into(),
//! # };
//!
//! let store = TaskStore::new();
//! store.add_tasks(vec![task]);
//! let runnable = store.get_runnable_tasks();
//! store.complete(CompletedTask::failed(runnable[0].id.clone())).unwrap();
//! assert_eq!(store.num_pending_tasks(), 0);
//! ```

#![warn(missing_docs)]

use siphon_domain::{CompletedTask, Task, TaskId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Errors that can occur during store operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// No task with this id is known
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// The task is not in the state the operation requires
    #[error("Task {task_id} is {actual}, expected {expected}")]
    InvalidState {
        /// Task the operation targeted
        task_id: TaskId,
        /// State the operation requires
        expected: &'static str,
        /// State the task is in
        actual: &'static str,
    },
}

/// What happened to a task after a failed report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportRetry {
    /// Outcome re-marked `Failed` and kept for one more attempt
    Retry,
    /// Second failure: the task was removed from the store
    Dropped,
}

#[derive(Debug)]
enum TaskState {
    Pending,
    Running,
    Finished(CompletedTask),
}

impl TaskState {
    fn name(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Finished(_) => "finished",
        }
    }
}

#[derive(Debug)]
struct Entry {
    task: Task,
    state: TaskState,
    report_failures: u8,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, Entry>,
    // Assignment order of pending tasks
    pending: VecDeque<TaskId>,
}

/// Thread-safe in-memory task store
///
/// Share it behind an `Arc`. Locks are never held across an await point.
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: Mutex<Inner>,
    added: Notify,
}

impl TaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State only moves forward, so a panicked holder cannot leave it torn
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert new tasks as pending, ignoring ids already known in any state
    ///
    /// Returns the number of tasks actually added.
    pub fn add_tasks(&self, tasks: impl IntoIterator<Item = Task>) -> usize {
        let mut added = 0;
        {
            let mut inner = self.lock();
            for task in tasks {
                if inner.tasks.contains_key(&task.id) {
                    debug!(task_id = %task.id, "Ignoring already known task");
                    continue;
                }
                debug!(task_id = %task.id, extractor = %task.extractor, "Added task");
                inner.pending.push_back(task.id.clone());
                inner.tasks.insert(
                    task.id.clone(),
                    Entry {
                        task,
                        state: TaskState::Pending,
                        report_failures: 0,
                    },
                );
                added += 1;
            }
        }
        if added > 0 {
            self.added.notify_one();
        }
        added
    }

    /// Move every pending task to running and return them in assignment order
    pub fn get_runnable_tasks(&self) -> Vec<Task> {
        let mut inner = self.lock();
        let ids: Vec<TaskId> = inner.pending.drain(..).collect();
        let mut runnable = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = inner.tasks.get_mut(&id) {
                entry.state = TaskState::Running;
                runnable.push(entry.task.clone());
            }
        }
        runnable
    }

    /// Record the outcome of a running task
    pub fn complete(&self, outcome: CompletedTask) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get_mut(&outcome.task_id)
            .ok_or_else(|| StoreError::NotFound(outcome.task_id.clone()))?;
        if !matches!(entry.state, TaskState::Running) {
            return Err(StoreError::InvalidState {
                task_id: outcome.task_id.clone(),
                expected: "running",
                actual: entry.state.name(),
            });
        }
        debug!(task_id = %outcome.task_id, outcome = %outcome.outcome, "Task finished");
        entry.state = TaskState::Finished(outcome);
        Ok(())
    }

    /// Remove a finished task whose outcome was delivered
    pub fn mark_reported(&self, task_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if !matches!(entry.state, TaskState::Finished(_)) {
            return Err(StoreError::InvalidState {
                task_id: task_id.to_string(),
                expected: "finished",
                actual: entry.state.name(),
            });
        }
        inner.tasks.remove(task_id);
        debug!(task_id, "Task reported");
        Ok(())
    }

    /// Record a failed report attempt for a finished task
    ///
    /// The first failure re-marks the outcome `Failed` so the next attempt
    /// reports a failure. The second drops the task; the coordinator is not
    /// told, it is expected to have timed the task out already.
    pub fn report_failed(&self, task_id: &str) -> Result<ReportRetry, StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        let outcome = match &mut entry.state {
            TaskState::Finished(outcome) => outcome,
            other => {
                return Err(StoreError::InvalidState {
                    task_id: task_id.to_string(),
                    expected: "finished",
                    actual: other.name(),
                })
            }
        };

        if entry.report_failures == 0 {
            entry.report_failures = 1;
            outcome.mark_failed();
            debug!(task_id, "Report failed, retrying as Failed");
            return Ok(ReportRetry::Retry);
        }

        inner.tasks.remove(task_id);
        warn!(task_id, "Report failed twice, dropping task");
        Ok(ReportRetry::Dropped)
    }

    /// Number of pending plus running tasks, the heartbeat load signal
    pub fn num_pending_tasks(&self) -> usize {
        self.lock()
            .tasks
            .values()
            .filter(|e| matches!(e.state, TaskState::Pending | TaskState::Running))
            .count()
    }

    /// Snapshot of finished tasks awaiting report, with their assignments
    pub fn finished_tasks(&self) -> Vec<(Task, CompletedTask)> {
        self.lock()
            .tasks
            .values()
            .filter_map(|e| match &e.state {
                TaskState::Finished(outcome) => Some((e.task.clone(), outcome.clone())),
                _ => None,
            })
            .collect()
    }

    /// Look up a task in any state
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.lock().tasks.get(task_id).map(|e| e.task.clone())
    }

    /// Total number of tasks held in any state
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether the store holds no tasks
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until `add_tasks` admits at least one new task
    ///
    /// A notification sent while nobody waits is kept for the next caller.
    pub async fn wait_for_tasks(&self) {
        self.added.notified().await;
    }
}
