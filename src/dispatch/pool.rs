//! Worker process pool
//!
//! ```text
//!   submit ──► queue (unbounded) ──► slot 0 ──► `<program> worker` (stdin/stdout)
//!                                └─► slot 1 ──► `<program> worker`
//!                                └─► ...
//! ```
//!
//! Each slot owns one child process and runs one job at a time, so at most
//! `count` engine calls are in flight. A slot whose child dies, times out or
//! answers garbage drops it and starts a fresh one for the next job.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{DispatchError, Dispatcher, Job, JobOutcome, Reply};
use crate::artifact::scoped_cleanup;
use crate::engine::output_path_for;

/// How long a worker gets to exit after its stdin closes
const EXIT_GRACE: Duration = Duration::from_secs(5);

struct Request {
    job: Job,
    respond_to: oneshot::Sender<Result<JobOutcome, DispatchError>>,
}

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<Request>>>;

/// Fixed-size pool of worker processes, created once at startup
pub struct ProcessPool {
    program: PathBuf,
    queue: RwLock<Option<mpsc::UnboundedSender<Request>>>,
    slots: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessPool {
    /// Start `count` slots, each running `<program> worker`.
    ///
    /// Must be called inside a tokio runtime. Workers that fail to start are
    /// retried when their slot picks up a job.
    pub fn start(program: PathBuf, count: usize, job_timeout: Duration) -> Self {
        let count = count.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(Mutex::new(receiver));

        let slots = (0..count)
            .map(|index| {
                let slot = Slot {
                    index,
                    program: program.clone(),
                    job_timeout,
                    worker: None,
                };
                tokio::spawn(slot.run(queue.clone()))
            })
            .collect();

        tracing::info!(
            workers = count,
            program = %program.display(),
            "Worker pool started"
        );

        Self {
            program,
            queue: RwLock::new(Some(sender)),
            slots: Mutex::new(slots),
        }
    }
}

#[async_trait]
impl Dispatcher for ProcessPool {
    async fn submit(&self, job: Job) -> Result<JobOutcome, DispatchError> {
        let sender = self
            .queue
            .read()
            .await
            .clone()
            .ok_or(DispatchError::PoolClosed)?;

        let (respond_to, rx) = oneshot::channel();
        sender
            .send(Request { job, respond_to })
            .map_err(|_| DispatchError::PoolClosed)?;

        rx.await.map_err(|_| DispatchError::PoolClosed)?
    }

    fn worker_program(&self) -> Option<&Path> {
        Some(&self.program)
    }

    /// Close the queue, let queued jobs finish, then wait for every slot
    async fn shutdown(&self) {
        self.queue.write().await.take();

        let slots = std::mem::take(&mut *self.slots.lock().await);
        for slot in slots {
            if let Err(e) = slot.await {
                tracing::error!("Worker slot ended abnormally: {}", e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

struct Slot {
    index: usize,
    program: PathBuf,
    job_timeout: Duration,
    worker: Option<WorkerProcess>,
}

impl Slot {
    async fn run(mut self, queue: Queue) {
        if let Err(e) = self.ensure_worker() {
            tracing::error!(slot = self.index, "{}", e);
        }

        loop {
            let request = queue.lock().await.recv().await;
            let Some(Request { job, respond_to }) = request else {
                break;
            };

            let result = self.execute(&job).await;
            if let (Job::Clean { path, .. }, Err(e)) = (&job, &result) {
                if !matches!(e, DispatchError::Job(_)) {
                    // A killed worker may have left its output behind
                    scoped_cleanup(&output_path_for(path)).await;
                }
            }

            if respond_to.send(result).is_err() {
                tracing::debug!(slot = self.index, "Requester went away, discarding result");
                scoped_cleanup(job.path()).await;
            }
        }

        if let Some(worker) = self.worker.take() {
            worker.finish().await;
        }
        tracing::debug!(slot = self.index, "Worker slot stopped");
    }

    fn ensure_worker(&mut self) -> Result<&mut WorkerProcess, DispatchError> {
        if let Some(worker) = self.worker.take() {
            return Ok(self.worker.insert(worker));
        }
        let worker = WorkerProcess::spawn(&self.program).map_err(DispatchError::Spawn)?;
        tracing::debug!(slot = self.index, pid = ?worker.child.id(), "Worker started");
        Ok(self.worker.insert(worker))
    }

    async fn execute(&mut self, job: &Job) -> Result<JobOutcome, DispatchError> {
        let timeout = self.job_timeout;
        let worker = self.ensure_worker()?;

        let result = match tokio::time::timeout(timeout, worker.call(job)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(timeout.as_secs())),
        };

        match result {
            Ok(reply) => reply.map_err(DispatchError::from),
            Err(e) => {
                tracing::warn!(slot = self.index, "Replacing worker: {}", e);
                // Dropping kills the child
                self.worker = None;
                Err(e)
            }
        }
    }
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(program: &Path) -> std::io::Result<Self> {
        let mut child = Command::new(program)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdin unavailable")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdout unavailable")
        })?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one job line and read one reply line
    async fn call(&mut self, job: &Job) -> Result<Reply, DispatchError> {
        let mut line =
            serde_json::to_vec(job).map_err(|e| DispatchError::Protocol(e.to_string()))?;
        line.push(b'\n');

        if let Err(e) = self.send(&line).await {
            return Err(DispatchError::WorkerCrashed(self.exit_reason(e).await));
        }

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply).await {
            Ok(0) => {
                return Err(DispatchError::WorkerCrashed(
                    self.exit_reason("closed its output").await,
                ))
            }
            Ok(_) => {}
            Err(e) => return Err(DispatchError::WorkerCrashed(self.exit_reason(e).await)),
        }

        serde_json::from_str(&reply).map_err(|e| DispatchError::Protocol(e.to_string()))
    }

    async fn send(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(line).await?;
        self.stdin.flush().await
    }

    /// Exit status if the child is already gone, else `fallback`
    async fn exit_reason(&mut self, fallback: impl std::fmt::Display) -> String {
        match tokio::time::timeout(Duration::from_millis(500), self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            _ => fallback.to_string(),
        }
    }

    /// Close stdin so the worker exits on its own; kill it if it lingers
    async fn finish(self) {
        let WorkerProcess {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => tracing::warn!("Worker exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for worker: {}", e),
            Err(_) => {
                tracing::warn!("Worker did not exit, killing it");
                if let Err(e) = child.kill().await {
                    tracing::error!("Failed to kill worker: {}", e);
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Worker stand-in that never answers
    fn silent_worker(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("silent-worker.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp_dir = TempDir::new().unwrap();
        let pool = ProcessPool::start(temp_dir.path().join("no-such-worker"), 1, TIMEOUT);

        let result = pool
            .submit_extract(temp_dir.path().join("a.txt"), true)
            .await;
        assert!(matches!(result, Err(DispatchError::Spawn(_))));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_exiting_worker_is_crash_not_engine_failure() {
        // `false worker` exits immediately without replying
        let pool = ProcessPool::start(PathBuf::from("false"), 1, TIMEOUT);

        for _ in 0..2 {
            let result = pool.submit_extract(PathBuf::from("/tmp/a.txt"), true).await;
            assert!(matches!(result, Err(DispatchError::WorkerCrashed(_))), "{:?}", result);
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_jobs() {
        let pool = ProcessPool::start(PathBuf::from("false"), 2, TIMEOUT);
        pool.shutdown().await;

        let result = pool.submit_extract(PathBuf::from("/tmp/a.txt"), true).await;
        assert!(matches!(result, Err(DispatchError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_hung_worker_times_out_and_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let pool = ProcessPool::start(silent_worker(temp_dir.path()), 1, Duration::from_millis(300));

        for _ in 0..2 {
            let mut result = pool.submit_extract(temp_dir.path().join("a.txt"), true).await;
            // A freshly written script can briefly be busy for exec
            if matches!(result, Err(DispatchError::Spawn(_))) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                result = pool.submit_extract(temp_dir.path().join("a.txt"), true).await;
            }
            assert!(matches!(result, Err(DispatchError::Timeout(_))), "{:?}", result);
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_job_removes_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("abc-notes.txt");
        std::fs::write(&artifact, b"plain words").unwrap();
        let pool = ProcessPool::start(PathBuf::from("false"), 1, TIMEOUT);

        // Queue the job, then stop waiting for it
        assert!(pool
            .submit_extract(artifact.clone(), true)
            .now_or_never()
            .is_none());

        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while artifact.exists() {
            assert!(tokio::time::Instant::now() < deadline, "artifact was not removed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pool.shutdown().await;
    }
}
