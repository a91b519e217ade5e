//! Job executor.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use showcase_media::{DownloadConfig, HttpFetcher, QuotaPolicy, SlideshowConfig, SlideshowEngine};
use showcase_queue::{Delivery, JobQueue, QueueJob, SweepJob};
use showcase_store::SessionStore;

use crate::config::{TimeLimits, WorkerConfig};
use crate::dispatch::JobDispatcher;
use crate::error::{WorkerError, WorkerResult};
use crate::layout::MediaLayout;
use crate::metrics;
use crate::pipeline::{IngestOutcome, SessionPipeline};
use crate::slideshow_job::{RenderJobOutcome, SlideshowStage};
use crate::sweeper::LifecycleSweeper;

/// Run `f` under a soft and a hard limit.
///
/// The receiver handed to `f` flips to true at the soft limit. At the hard
/// limit the future is dropped, which kills any child process it owns.
/// Returns `None` on a hard timeout.
pub async fn run_with_limits<F, Fut, T>(limits: TimeLimits, f: F) -> Option<T>
where
    F: FnOnce(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = T>,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let soft = limits.soft;
    let timer = tokio::spawn(async move {
        tokio::time::sleep(soft).await;
        debug!("Soft time limit reached");
        let _ = cancel_tx.send(true);
    });

    let result = tokio::time::timeout(limits.hard, f(cancel_rx)).await.ok();
    timer.abort();
    result
}

/// Everything needed to run any job kind.
pub struct JobHandlers {
    config: WorkerConfig,
    pipeline: SessionPipeline,
    slideshow: SlideshowStage,
    sweeper: LifecycleSweeper,
}

impl JobHandlers {
    pub fn new(
        config: WorkerConfig,
        pipeline: SessionPipeline,
        slideshow: SlideshowStage,
        sweeper: LifecycleSweeper,
    ) -> Self {
        Self {
            config,
            pipeline,
            slideshow,
            sweeper,
        }
    }

    /// Build the standard handler set from environment configuration.
    pub fn from_env(
        config: WorkerConfig,
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> WorkerResult<Self> {
        let layout = MediaLayout::new(&config.media_root);
        let fetcher = HttpFetcher::new(DownloadConfig::from_env())
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;

        let pipeline = SessionPipeline::new(layout.clone(), Arc::clone(&store), dispatcher, Arc::new(fetcher))
            .with_quota(QuotaPolicy::from_env());
        let slideshow = SlideshowStage::new(
            layout.clone(),
            Arc::clone(&store),
            SlideshowEngine::new(SlideshowConfig::from_env()),
        );
        let sweeper = LifecycleSweeper::new(layout, store);

        Ok(Self::new(config, pipeline, slideshow, sweeper))
    }

    /// Run one job to completion.
    ///
    /// Job failures are recorded on the session and count as handled; only
    /// infrastructure errors are returned.
    pub async fn handle(&self, job: &QueueJob) -> WorkerResult<()> {
        let kind = job.kind();
        match job {
            QueueJob::ProcessSession(j) => {
                let limits = self.config.ingest_limits;
                match run_with_limits(limits, |cancel| self.pipeline.process_session(j, cancel)).await {
                    Some(outcome) => match outcome? {
                        IngestOutcome::Failed(failure) => metrics::record_job_failed(kind, failure.kind()),
                        IngestOutcome::Skipped | IngestOutcome::Ready { .. } => {
                            metrics::record_job_completed(kind)
                        }
                    },
                    None => {
                        self.pipeline.handle_timeout(j, limits.hard.as_secs()).await?;
                        metrics::record_job_failed(kind, "timeout");
                    }
                }
            }
            QueueJob::RenderSlideshow(j) => {
                let limits = self.config.render_limits;
                match run_with_limits(limits, |cancel| self.slideshow.render_slideshow(j, cancel)).await {
                    Some(outcome) => match outcome? {
                        RenderJobOutcome::Failed(failure) => metrics::record_job_failed(kind, failure.kind()),
                        RenderJobOutcome::Skipped | RenderJobOutcome::Rendered { .. } => {
                            metrics::record_job_completed(kind)
                        }
                    },
                    None => {
                        self.slideshow.handle_timeout(j, limits.hard.as_secs()).await?;
                        metrics::record_job_failed(kind, "timeout");
                    }
                }
            }
            QueueJob::Sweep(_) => {
                self.sweeper.sweep(Utc::now()).await?;
                metrics::record_job_completed(kind);
            }
        }
        Ok(())
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    handlers: Arc<JobHandlers>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, handlers: JobHandlers) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            handlers: Arc::new(handlers),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns after [`JobExecutor::shutdown`].
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.handlers),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));
        let sweep_task = tokio::spawn(Self::sweep_schedule(
            Arc::clone(&self.queue),
            self.config.sweep_interval,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();
        sweep_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be redelivered",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;
        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::queue_failed("semaphore closed"))?;
            let queue = Arc::clone(&self.queue);
            let handlers = Arc::clone(&self.handlers);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(handlers, queue, delivery).await;
            });
        }
        Ok(())
    }

    /// Take over deliveries left pending by a crashed worker.
    async fn claim_loop(
        queue: Arc<JobQueue>,
        handlers: Arc<JobHandlers>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        config: WorkerConfig,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.claim_interval);
        let min_idle_ms = config.claim_min_idle.as_millis() as u64;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                        Ok(deliveries) if !deliveries.is_empty() => {
                            info!("Claimed {} pending jobs", deliveries.len());
                            for delivery in deliveries {
                                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                    break;
                                };
                                let queue = Arc::clone(&queue);
                                let handlers = Arc::clone(&handlers);
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    Self::execute_job(handlers, queue, delivery).await;
                                });
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim pending jobs: {}", e),
                    }
                }
            }
        }
    }

    /// Enqueue a sweep every `interval`. Per-minute dedup keys keep a fleet
    /// of workers down to one sweep per tick.
    async fn sweep_schedule(queue: Arc<JobQueue>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = queue.dispatch_sweep(SweepJob::new()).await {
                        warn!("Failed to schedule sweep: {}", e);
                    }
                }
            }
        }
    }

    /// Execute a single delivery with retry and DLQ handling.
    async fn execute_job(handlers: Arc<JobHandlers>, queue: Arc<JobQueue>, delivery: Delivery) {
        let job = &delivery.job;
        let job_id = job.job_id().to_string();
        info!("Executing {} job {}", job.kind(), job_id);

        match handlers.handle(job).await {
            Ok(()) => {
                info!("Job {} completed", job_id);
                if let Err(e) = queue.ack(delivery.lane, &delivery.message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                if let Err(e) = queue.release(job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);

                let max_retries = queue.max_retries();
                let retry_count = if e.is_retryable() {
                    queue.increment_retry(&delivery.message_id).await.unwrap_or(u32::MAX)
                } else {
                    u32::MAX
                };

                if retry_count >= max_retries {
                    warn!("Job {} will not be retried, moving to DLQ", job_id);
                    metrics::record_job_failed(job.kind(), "dead_letter");
                    if let Err(dlq_err) = queue.dlq(&delivery, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                    }
                    if let Err(e) = queue.release(job).await {
                        warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                    }
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{})",
                        job_id, retry_count, max_retries
                    );
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Receiver that observes the shutdown flag.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
