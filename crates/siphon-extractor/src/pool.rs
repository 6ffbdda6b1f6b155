//! Worker process pool
//!
//! Extraction runs in child processes so a crashing or hung extractor cannot
//! take down task bookkeeping or the heartbeat stream. Workers are spawned
//! lazily, reused while healthy, and replaced after a crash or timeout.
//!
//! # Architecture
//!
//! ```text
//! extract_batch ─┬─ group "chunker" ─> permit ─> idle worker (or spawn) ─> ndjson request/response
//!                └─ group "model-x" ─> permit ─> idle worker (or spawn) ─> ...
//! ```
//!
//! A semaphore bounds the number of live requests to the pool size. Every
//! child is spawned with `kill_on_drop`, so dropping the pool (or cancelling
//! an in-flight request) terminates the process.

use crate::error::ExtractorError;
use crate::executor::{group_by_extractor, zip_results, BatchOutputs, ExtractionExecutor, ExtractionItem};
use crate::protocol::{WireInput, WorkerRequest, WorkerResponse};
use async_trait::async_trait;
use futures::future::join_all;
use siphon_domain::{Extracted, ExtractorDescription};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

type ExtractResult = Result<Vec<Extracted>, ExtractorError>;

/// Default per-request deadline
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How to start a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Program to run
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// Run `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `<program> worker [--catalog <path>]`, the `siphon` worker entry point
    pub fn siphon_worker(program: impl Into<PathBuf>, catalog: Option<&Path>) -> Self {
        let command = Self::new(program).arg("worker");
        match catalog {
            Some(path) => command.arg("--catalog").arg(path.as_os_str()),
            None => command,
        }
    }

    /// Re-run the current executable as a worker
    pub fn current_exe(catalog: Option<&Path>) -> Result<Self, ExtractorError> {
        Ok(Self::siphon_worker(std::env::current_exe()?, catalog))
    }
}

/// A live worker process
#[derive(Debug)]
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand) -> Result<Self, ExtractorError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractorError::Worker("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::Worker("worker stdout unavailable".to_string()))?;

        info!(pid = ?child.id(), program = %command.program.display(), "Spawned worker");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn call(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, ExtractorError> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;

        let mut response = String::new();
        let read = self.stdout.read_line(&mut response).await?;
        if read == 0 {
            let status = self.child.try_wait().ok().flatten();
            return Err(ExtractorError::Worker(match status {
                Some(status) => format!("worker exited with {status}"),
                None => "worker closed its output".to_string(),
            }));
        }
        Ok(serde_json::from_str(&response)?)
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Worker already gone");
        }
    }
}

/// Pool of worker processes implementing [`ExtractionExecutor`]
#[derive(Debug)]
pub struct ProcessPool {
    command: WorkerCommand,
    size: usize,
    timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<WorkerProcess>>,
}

impl ProcessPool {
    /// Create a pool of at most `size` workers
    pub fn new(command: WorkerCommand, size: usize, timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            command,
            size,
            timeout,
            permits: Semaphore::new(size),
            idle: Mutex::new(Vec::with_capacity(size)),
        }
    }

    /// Maximum number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of live idle workers
    pub fn idle_workers(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Send one request to a worker, replacing the worker if it fails
    pub async fn request(&self, request: WorkerRequest) -> Result<WorkerResponse, ExtractorError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractorError::Worker("pool is shut down".to_string()))?;

        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let mut worker = match pooled {
            Some(worker) => worker,
            None => WorkerProcess::spawn(&self.command)?,
        };

        match tokio::time::timeout(self.timeout, worker.call(&request)).await {
            Ok(Ok(response)) => {
                self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(worker);
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Worker failed, discarding it");
                worker.kill().await;
                Err(e)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Worker timed out, killing it");
                worker.kill().await;
                Err(ExtractorError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn run_group(&self, extractor: String, inputs: Vec<WireInput>, count: usize) -> Vec<ExtractResult> {
        let request = WorkerRequest::Extract { extractor, inputs };
        let fail_all = |make: &dyn Fn() -> ExtractorError| -> Vec<ExtractResult> {
            (0..count).map(|_| Err(make())).collect()
        };

        match self.request(request).await {
            Ok(WorkerResponse::Extracted { results }) => results.into_iter().map(Into::into).collect(),
            Ok(WorkerResponse::Failed { error }) => {
                let error = ExtractorError::from(error);
                let message = error.to_string();
                match error {
                    ExtractorError::UnknownExtractor(name) => {
                        fail_all(&|| ExtractorError::UnknownExtractor(name.clone()))
                    }
                    _ => fail_all(&|| ExtractorError::Worker(message.clone())),
                }
            }
            Ok(other) => fail_all(&|| ExtractorError::Worker(format!("unexpected response {other:?}"))),
            Err(ExtractorError::Timeout(secs)) => fail_all(&|| ExtractorError::Timeout(secs)),
            Err(e) => {
                let message = e.to_string();
                fail_all(&|| ExtractorError::Worker(message.clone()))
            }
        }
    }
}

#[async_trait]
impl ExtractionExecutor for ProcessPool {
    async fn extract_batch(&self, items: Vec<ExtractionItem>) -> BatchOutputs {
        let groups = group_by_extractor(items);
        debug!(groups = groups.len(), "Dispatching extraction groups");

        let calls = groups.into_iter().map(|(extractor, group)| async move {
            let count = group.task_ids.len();
            let inputs = group.inputs.into_iter().map(WireInput::from).collect();
            let results = self.run_group(extractor, inputs, count).await;
            (group.task_ids, results)
        });

        let mut out = BatchOutputs::new();
        for (task_ids, results) in join_all(calls).await {
            zip_results(task_ids, results, &mut out);
        }
        out
    }

    async fn describe(&self, extractor: &str) -> Result<ExtractorDescription, ExtractorError> {
        let request = WorkerRequest::Describe {
            extractor: extractor.to_string(),
        };
        match self.request(request).await? {
            WorkerResponse::Described { description } => Ok(description),
            WorkerResponse::Failed { error } => Err(error.into()),
            other => Err(ExtractorError::Worker(format!("unexpected response {other:?}"))),
        }
    }

    async fn shutdown(&self) {
        self.permits.close();
        let workers: Vec<WorkerProcess> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        info!(workers = workers.len(), "Stopping worker processes");
        for worker in workers {
            worker.kill().await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use siphon_domain::Content;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh").arg("-c").arg(script)
    }

    fn item(task_id: &str, extractor: &str) -> ExtractionItem {
        ExtractionItem {
            task_id: task_id.to_string(),
            extractor: extractor.to_string(),
            content: Content::from_text("x"),
            params: None,
        }
    }

    #[test]
    fn test_siphon_worker_command() {
        let command = WorkerCommand::siphon_worker("/usr/bin/siphon", Some(Path::new("/etc/catalog.toml")));
        assert_eq!(command.args, vec!["worker", "--catalog", "/etc/catalog.toml"]);
        assert_eq!(WorkerCommand::siphon_worker("siphon", None).args, vec!["worker"]);
    }

    #[tokio::test]
    async fn test_crashing_worker_fails_its_batch() {
        let pool = ProcessPool::new(sh("read line; exit 1"), 1, Duration::from_secs(5));
        let out = pool.extract_batch(vec![item("t1", "echo"), item("t2", "echo")]).await;

        assert!(matches!(out["t1"], Err(ExtractorError::Worker(_))));
        assert!(matches!(out["t2"], Err(ExtractorError::Worker(_))));
        assert_eq!(pool.idle_workers(), 0);
    }

    #[tokio::test]
    async fn test_hung_worker_times_out() {
        let pool = ProcessPool::new(sh("sleep 30"), 1, Duration::from_millis(200));
        let out = pool.extract_batch(vec![item("t1", "echo")]).await;

        assert!(matches!(out["t1"], Err(ExtractorError::Timeout(_))));
        assert_eq!(pool.idle_workers(), 0);
    }

    #[tokio::test]
    async fn test_healthy_worker_is_reused() {
        // Answers every request line with an empty success
        let script = r#"while read line; do echo '{"status":"extracted","results":[{"status":"ok","outputs":[]}]}'; done"#;
        let pool = ProcessPool::new(sh(script), 2, Duration::from_secs(5));

        let out = pool.extract_batch(vec![item("t1", "echo")]).await;
        assert!(out["t1"].as_ref().unwrap().is_empty());
        assert_eq!(pool.idle_workers(), 1);

        let out = pool.extract_batch(vec![item("t2", "echo")]).await;
        assert!(out["t2"].is_ok());
        assert_eq!(pool.idle_workers(), 1);

        pool.shutdown().await;
        assert_eq!(pool.idle_workers(), 0);
    }
}
