//! Worker dispatch
//!
//! Engine calls are CPU-bound and parse untrusted input, so they never run
//! on the request path. Handlers hand a [`Job`] to a [`Dispatcher`] and await
//! exactly one reply.
//!
//! - [`ProcessPool`]: fixed set of `worker` child processes fed from one queue
//! - [`InlineDispatcher`]: same routine on tokio's blocking pool (tests, `--inline`)

mod inline;
pub mod job;
mod pool;
pub mod worker;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::{CleaningConfig, Metadata};

pub use inline::InlineDispatcher;
pub use pool::ProcessPool;

/// One unit of engine work on an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Job {
    Extract { path: PathBuf, sandbox: bool },
    Clean { path: PathBuf, config: CleaningConfig },
}

impl Job {
    /// The artifact this job operates on
    pub fn path(&self) -> &Path {
        match self {
            Job::Extract { path, .. } | Job::Clean { path, .. } => path,
        }
    }
}

/// Successful engine result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Metadata { metadata: Metadata },
    /// `true` once the cleaned output has replaced the artifact
    Cleaned { cleaned: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    Engine,
    Resource,
}

/// Failure reported by the engine itself, as opposed to a broken worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn unsupported(label: &str) -> Self {
        Self {
            kind: FailureKind::UnsupportedFormat,
            message: format!("format ({}) is not supported", label),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Engine,
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Resource,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobFailure {}

/// What a worker writes back for each job line
pub type Reply = Result<JobOutcome, JobFailure>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Job(#[from] JobFailure),

    #[error("worker process failed: {0}")]
    WorkerCrashed(String),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("job did not finish within {0} seconds")]
    Timeout(u64),

    #[error("failed to start worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker pool is shut down")]
    PoolClosed,
}

/// Runs engine jobs off the request path
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Submit one job and wait for its outcome
    async fn submit(&self, job: Job) -> Result<JobOutcome, DispatchError>;

    async fn submit_extract(&self, path: PathBuf, sandbox: bool) -> Result<Metadata, DispatchError> {
        match self.submit(Job::Extract { path, sandbox }).await? {
            JobOutcome::Metadata { metadata } => Ok(metadata),
            other => Err(DispatchError::Protocol(format!(
                "expected metadata, got {:?}",
                other
            ))),
        }
    }

    async fn submit_clean(
        &self,
        path: PathBuf,
        config: CleaningConfig,
    ) -> Result<bool, DispatchError> {
        match self.submit(Job::Clean { path, config }).await? {
            JobOutcome::Cleaned { cleaned } => Ok(cleaned),
            other => Err(DispatchError::Protocol(format!(
                "expected clean result, got {:?}",
                other
            ))),
        }
    }

    /// Executable re-run for each worker, when workers are processes
    fn worker_program(&self) -> Option<&Path> {
        None
    }

    /// Stop accepting jobs and release workers
    async fn shutdown(&self) {}
}
