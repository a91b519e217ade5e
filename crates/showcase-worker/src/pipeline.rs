//! Session ingestion: fetch, extract, probe, publish.
//!
//! One [`ProcessSessionJob`] walks a session from `queued` to `ready`:
//!
//! ```text
//! queued -> [downloading] -> processing(10) -> processing(50) -> ready(90) -> render job
//!                                                             \-> ready(100) when there are no images
//! ```
//!
//! Ingestion and probing failures are fatal for the session: the media
//! directory is removed and the record is kept as `failed`.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

use showcase_media::fs_utils::remove_dir_if_exists;
use showcase_media::{
    write_manifest, ArchiveExtractor, ArchiveFetcher, FfmpegRunner, ManifestBuilder, MediaError,
    MediaFormats, MediaProber, QuotaPolicy,
};
use showcase_models::session::progress;
use showcase_models::{Manifest, SessionRecord};
use showcase_queue::{ProcessSessionJob, RenderSlideshowJob};
use showcase_store::SessionStore;

use crate::dispatch::JobDispatcher;
use crate::error::{JobFailure, StepError, WorkerResult};
use crate::layout::MediaLayout;
use crate::logging::JobLogger;

/// Result of one ingestion job.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Nothing to do: the record is gone or already past ingestion.
    Skipped,
    /// Manifest published.
    Ready {
        images: usize,
        videos: usize,
        audio_files: usize,
        slideshow_scheduled: bool,
    },
    /// The session was marked `failed`.
    Failed(JobFailure),
}

/// Drives a session through ingestion.
pub struct SessionPipeline {
    layout: MediaLayout,
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: ArchiveExtractor,
    formats: MediaFormats,
}

impl SessionPipeline {
    pub fn new(
        layout: MediaLayout,
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            layout,
            store,
            dispatcher,
            fetcher,
            extractor: ArchiveExtractor::new(QuotaPolicy::default()),
            formats: MediaFormats::default(),
        }
    }

    pub fn with_quota(mut self, policy: QuotaPolicy) -> Self {
        self.extractor = ArchiveExtractor::new(policy);
        self
    }

    pub fn with_formats(mut self, formats: MediaFormats) -> Self {
        self.formats = formats;
        self
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    /// Run ingestion for one job.
    ///
    /// `cancel` flips at the soft time limit and stops running encoders.
    /// Only infrastructure errors are returned; session failures are
    /// recorded and reported through [`IngestOutcome::Failed`].
    pub async fn process_session(
        &self,
        job: &ProcessSessionJob,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<IngestOutcome> {
        let logger = JobLogger::new(&job.job_id, &job.session_id, "ingest");

        let Some(mut record) = self.store.get(&job.session_id).await? else {
            logger.log_warning("no session record, dropping job");
            return Ok(IngestOutcome::Skipped);
        };
        if record.awaiting_slideshow() {
            logger.log_warning("manifest already published, scheduling slideshow again");
            return match self.schedule_render(job, &mut record, &logger).await {
                Ok(slideshow_scheduled) => Ok(ready_outcome(&record, slideshow_scheduled)),
                Err(StepError::Failure(failure)) => Ok(IngestOutcome::Failed(failure)),
                Err(StepError::Infra(e)) => Err(e),
            };
        }
        if !record.status.is_ingesting() {
            logger.log_warning(&format!("session is already {}, skipping", record.status));
            return Ok(IngestOutcome::Skipped);
        }

        logger.log_start(record.source_kind.as_str());
        match self.ingest(job, &mut record, &logger, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(StepError::Failure(failure)) => {
                self.fail_session(&mut record, &failure, &logger).await?;
                Ok(IngestOutcome::Failed(failure))
            }
            Err(StepError::Infra(e)) => Err(e),
        }
    }

    async fn ingest(
        &self,
        job: &ProcessSessionJob,
        record: &mut SessionRecord,
        logger: &JobLogger,
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestOutcome, StepError> {
        let id = record.id.clone();
        let session_dir = self.layout.session_dir(&id);
        let archive = self.layout.archive_path(&id);
        let remote = record.source_kind.is_remote();

        // Redelivered jobs start from a clean directory; uploads keep their archive.
        self.layout.reset_session_dir(&id, !remote).await?;

        if remote {
            let url = job
                .source_url
                .clone()
                .or_else(|| record.source_url.clone())
                .ok_or_else(|| JobFailure::fatal("invalid_source", "remote session has no source URL"))?;

            record.begin_download()?;
            self.store.put(record).await?;
            logger.log_progress("downloading", record.progress);

            let bytes = self.fetcher.fetch(&url, record.source_kind, &archive).await?;
            logger.log_progress(&format!("downloaded {} bytes", bytes), record.progress);
        }

        record.begin_processing(progress::EXTRACTING)?;
        self.store.put(record).await?;
        logger.log_progress("extracting", record.progress);

        let extraction = self.extractor.extract(&archive, &session_dir).await?;

        record.begin_processing(progress::PROBING)?;
        self.store.put(record).await?;
        logger.log_progress(
            &format!("probing {} extracted files", extraction.files.len()),
            record.progress,
        );

        let prober = MediaProber::new(self.formats.clone())
            .with_runner(FfmpegRunner::new().with_cancel(cancel));
        let report = prober.probe_dir(&session_dir).await.map_err(|e| match e {
            MediaError::Cancelled => {
                JobFailure::fatal("timeout", "probing stopped at the soft time limit")
            }
            other => JobFailure::fatal("probe", other.to_string()),
        })?;
        for dropped in &report.dropped {
            logger.log_warning(&format!("dropped {}: {}", dropped.filename, dropped.reason));
        }

        let manifest = ManifestBuilder::new(id.clone())
            .extend(report.files)
            .build(Utc::now());
        write_manifest(&session_dir, &manifest)
            .await
            .map_err(|e| JobFailure::fatal("manifest", e.to_string()))?;

        self.publish(job, record, manifest, logger).await
    }

    /// Make the session browsable and hand rendering to its own job.
    async fn publish(
        &self,
        job: &ProcessSessionJob,
        record: &mut SessionRecord,
        manifest: Manifest,
        logger: &JobLogger,
    ) -> Result<IngestOutcome, StepError> {
        let (images, videos, audio_files) = (
            manifest.images.len(),
            manifest.videos.len(),
            manifest.audio_files.len(),
        );

        if !manifest.has_images() {
            record.publish_final_manifest(manifest)?;
            self.store.put(record).await?;
            logger.log_completion(&format!(
                "ready without slideshow ({} videos, {} audio)",
                videos, audio_files
            ));
            return Ok(IngestOutcome::Ready {
                images,
                videos,
                audio_files,
                slideshow_scheduled: false,
            });
        }

        record.publish_manifest(manifest)?;
        self.store.put(record).await?;
        logger.log_progress("manifest published", record.progress);

        let slideshow_scheduled = self.schedule_render(job, record, logger).await?;

        logger.log_completion(&format!(
            "{} images, {} videos, {} audio",
            images, videos, audio_files
        ));
        Ok(IngestOutcome::Ready {
            images,
            videos,
            audio_files,
            slideshow_scheduled,
        })
    }

    /// Enqueue the render job. A queue failure is recorded on the session,
    /// which stays browsable.
    async fn schedule_render(
        &self,
        job: &ProcessSessionJob,
        record: &mut SessionRecord,
        logger: &JobLogger,
    ) -> Result<bool, StepError> {
        let options = record
            .slideshow_options
            .clone()
            .or_else(|| job.slideshow_options.clone())
            .unwrap_or_default();
        let render = RenderSlideshowJob::new(record.id.clone(), options);
        match self.dispatcher.dispatch_render(render).await {
            Ok(()) => Ok(true),
            Err(e) => {
                logger.log_error(&format!("could not schedule slideshow: {}", e));
                record.record_render_error(format!("could not schedule slideshow: {}", e))?;
                self.store.put(record).await?;
                Ok(false)
            }
        }
    }

    async fn fail_session(
        &self,
        record: &mut SessionRecord,
        failure: &JobFailure,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        logger.log_error(&failure.to_string());

        let session_dir = self.layout.session_dir(&record.id);
        if let Err(e) = remove_dir_if_exists(&session_dir).await {
            logger.log_warning(&format!("could not remove media directory: {}", e));
        }

        record.fail(failure.to_string())?;
        self.store.put(record).await?;
        Ok(())
    }

    /// Record a hard time-limit hit. The partial directory is left for the sweeper.
    pub async fn handle_timeout(&self, job: &ProcessSessionJob, limit_secs: u64) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.job_id, &job.session_id, "ingest");
        let Some(mut record) = self.store.get(&job.session_id).await? else {
            return Ok(());
        };
        if !record.status.is_ingesting() {
            return Ok(());
        }

        let failure = JobFailure::timed_out("ingestion", limit_secs, true);
        logger.log_error(&failure.to_string());
        record.fail(failure.to_string())?;
        self.store.put(&record).await?;
        Ok(())
    }
}

fn ready_outcome(record: &SessionRecord, slideshow_scheduled: bool) -> IngestOutcome {
    let (images, videos, audio_files) = record
        .manifest
        .as_ref()
        .map(|m| (m.images.len(), m.videos.len(), m.audio_files.len()))
        .unwrap_or_default();
    IngestOutcome::Ready {
        images,
        videos,
        audio_files,
        slideshow_scheduled,
    }
}
