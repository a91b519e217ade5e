//! Handing follow-up work to the job queue.

use async_trait::async_trait;
use tracing::debug;

use showcase_queue::{JobQueue, ProcessSessionJob, QueueError, RenderSlideshowJob, SweepJob};

use crate::error::WorkerResult;

/// Where the pipeline sends jobs. Delivery is at least once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Start ingestion and probing for a new session.
    async fn dispatch_ingest(&self, job: ProcessSessionJob) -> WorkerResult<()>;

    /// Start slideshow rendering for a probed session.
    async fn dispatch_render(&self, job: RenderSlideshowJob) -> WorkerResult<()>;

    /// Run the lifecycle sweeper once.
    async fn dispatch_sweep(&self, job: SweepJob) -> WorkerResult<()>;
}

/// A duplicate is an already-queued job, which is what the caller wanted.
fn accept_duplicate(result: Result<String, QueueError>) -> WorkerResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(QueueError::Duplicate(key)) => {
            debug!("Job already queued: {}", key);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch_ingest(&self, job: ProcessSessionJob) -> WorkerResult<()> {
        accept_duplicate(self.enqueue_process(job).await)
    }

    async fn dispatch_render(&self, job: RenderSlideshowJob) -> WorkerResult<()> {
        accept_duplicate(self.enqueue_render(job).await)
    }

    async fn dispatch_sweep(&self, job: SweepJob) -> WorkerResult<()> {
        accept_duplicate(self.enqueue_sweep(job).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;

    #[test]
    fn test_duplicates_are_accepted() {
        assert!(accept_duplicate(Ok("1-0".into())).is_ok());
        assert!(accept_duplicate(Err(QueueError::Duplicate("ingest:s".into()))).is_ok());
        assert!(matches!(
            accept_duplicate(Err(QueueError::enqueue_failed("boom"))),
            Err(WorkerError::Queue(_))
        ));
    }
}
