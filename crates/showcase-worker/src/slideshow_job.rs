//! Slideshow stage: render a ready session's images into one video.
//!
//! Runs as its own job after the interim manifest is published. Failures
//! here never fail the session; the message is recorded on the `ready`
//! record instead.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use showcase_media::{write_manifest, AudioTrack, FfmpegRunner, SlideshowEngine};
use showcase_models::encoding::SLIDESHOW_FILENAME;
use showcase_models::{Manifest, MediaFile, SessionId, SessionStatus, SlideshowOptions};
use showcase_queue::RenderSlideshowJob;
use showcase_store::SessionStore;

use crate::error::{JobFailure, StepError, WorkerResult};
use crate::layout::MediaLayout;
use crate::logging::JobLogger;

/// Result of one render job.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderJobOutcome {
    /// The session is gone, not ready, or has nothing to render.
    Skipped,
    Rendered {
        images: usize,
        duration_secs: f64,
    },
    /// Rendering failed; the session stays `ready` with the error recorded.
    Failed(JobFailure),
}

/// Pick the background track.
///
/// An explicit choice must name an audio file of the manifest; without one
/// the first audio file (by filename) is used, if any.
pub fn resolve_music<'a>(
    manifest: &'a Manifest,
    options: &SlideshowOptions,
) -> Result<Option<&'a MediaFile>, JobFailure> {
    match options.background_music.as_deref() {
        Some(name) => manifest.find_audio(name).map(Some).ok_or_else(|| {
            JobFailure::recoverable(
                "invalid_options",
                format!("background music '{}' is not an audio file of this session", name),
            )
        }),
        None => Ok(manifest.audio_files.first()),
    }
}

/// Renders slideshows for ready sessions.
pub struct SlideshowStage {
    layout: MediaLayout,
    store: Arc<dyn SessionStore>,
    engine: SlideshowEngine,
}

impl SlideshowStage {
    pub fn new(layout: MediaLayout, store: Arc<dyn SessionStore>, engine: SlideshowEngine) -> Self {
        Self {
            layout,
            store,
            engine,
        }
    }

    /// Run one render job.
    pub async fn render_slideshow(
        &self,
        job: &RenderSlideshowJob,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<RenderJobOutcome> {
        let logger = JobLogger::new(&job.job_id, &job.session_id, "slideshow");

        let Some(mut record) = self.store.get(&job.session_id).await? else {
            logger.log_warning("no session record, dropping job");
            return Ok(RenderJobOutcome::Skipped);
        };
        if !matches!(
            record.status,
            SessionStatus::Ready | SessionStatus::GeneratingSlideshow
        ) {
            logger.log_warning(&format!("session is {}, not rendering", record.status));
            return Ok(RenderJobOutcome::Skipped);
        }
        let Some(manifest) = record.manifest.clone().filter(|m| m.has_images()) else {
            logger.log_warning("session has no images, not rendering");
            return Ok(RenderJobOutcome::Skipped);
        };

        logger.log_start(&format!(
            "{} images, {} transition, {}",
            manifest.images.len(),
            job.options.transition_effect,
            job.options.resolution
        ));

        if record.media_expired(Utc::now()) {
            let failure = JobFailure::recoverable("media_expired", "session media has expired");
            logger.log_warning(&failure.to_string());
            record.record_render_error(failure.to_string())?;
            self.store.put(&record).await?;
            return Ok(RenderJobOutcome::Failed(failure));
        }

        record.begin_slideshow(job.options.clone())?;
        self.store.put(&record).await?;

        match self.render(&record.id, manifest, &job.options, cancel).await {
            Ok((manifest, images, duration_secs)) => {
                record.attach_slideshow(manifest)?;
                self.store.put(&record).await?;
                logger.log_completion(&format!("{} images, {:.1} s", images, duration_secs));
                Ok(RenderJobOutcome::Rendered {
                    images,
                    duration_secs,
                })
            }
            Err(StepError::Failure(failure)) => {
                logger.log_error(&failure.to_string());
                record.record_render_error(failure.to_string())?;
                self.store.put(&record).await?;
                Ok(RenderJobOutcome::Failed(failure))
            }
            Err(StepError::Infra(e)) => Err(e),
        }
    }

    async fn render(
        &self,
        id: &SessionId,
        mut manifest: Manifest,
        options: &SlideshowOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<(Manifest, usize, f64), StepError> {
        options
            .check()
            .map_err(|e| JobFailure::recoverable("invalid_options", e.to_string()))?;

        let session_dir = self.layout.session_dir(id);
        let audio = resolve_music(&manifest, options)?.map(|file| AudioTrack {
            path: session_dir.join(&file.path),
            duration: file.duration,
        });
        let images: Vec<PathBuf> = manifest
            .images
            .iter()
            .map(|file| session_dir.join(&file.path))
            .collect();

        let engine = self
            .engine
            .clone()
            .with_runner(FfmpegRunner::new().with_cancel(cancel));
        let outcome = engine
            .render(&images, &self.layout.slideshow_path(id), options, audio.as_ref())
            .await?;

        manifest.attach_slideshow(SLIDESHOW_FILENAME);
        write_manifest(&session_dir, &manifest)
            .await
            .map_err(|e| JobFailure::recoverable("manifest", e.to_string()))?;

        Ok((manifest, outcome.images.len(), outcome.duration_secs))
    }

    /// Record a hard time-limit hit on a render.
    pub async fn handle_timeout(&self, job: &RenderSlideshowJob, limit_secs: u64) -> WorkerResult<()> {
        let Some(mut record) = self.store.get(&job.session_id).await? else {
            return Ok(());
        };
        if record.status != SessionStatus::GeneratingSlideshow {
            return Ok(());
        }
        let failure = JobFailure::timed_out("slideshow", limit_secs, false);
        JobLogger::new(&job.job_id, &job.session_id, "slideshow").log_error(&failure.to_string());
        record.record_render_error(failure.to_string())?;
        self.store.put(&record).await?;
        Ok(())
    }
}
