//! In-process dispatcher

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, Semaphore};

use super::{job, DispatchError, Dispatcher, Job, JobOutcome};
use crate::artifact::scoped_cleanup;

/// Runs jobs on tokio's blocking pool, at most `concurrency` at a time.
///
/// No crash isolation: a panicking parser only fails its own job. Used by
/// tests and by `serve --inline`.
pub struct InlineDispatcher {
    permits: Arc<Semaphore>,
}

impl InlineDispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

#[async_trait]
impl Dispatcher for InlineDispatcher {
    async fn submit(&self, job: Job) -> Result<JobOutcome, DispatchError> {
        let permits = self.permits.clone();
        let (reply, rx) = oneshot::channel();

        // Detached so an abandoned request still gets its artifact removed
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = reply.send(Err(DispatchError::PoolClosed));
                return;
            };
            let path = job.path().to_path_buf();

            let result = match tokio::task::spawn_blocking(move || job::run(&job)).await {
                Ok(reply) => reply.map_err(DispatchError::from),
                Err(e) => Err(DispatchError::WorkerCrashed(e.to_string())),
            };

            if reply.send(result).is_err() {
                tracing::debug!("Requester went away, discarding result");
                scoped_cleanup(&path).await;
            }
        });

        rx.await.map_err(|_| DispatchError::PoolClosed)?
    }

    async fn shutdown(&self) {
        self.permits.close();
    }
}
