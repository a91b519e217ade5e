//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use showcase_models::{SessionId, SlideshowOptions, SourceKind};

/// Unique identifier for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job to ingest and probe a freshly submitted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSessionJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Session to process
    pub session_id: SessionId,
    /// Where the archive comes from
    pub source_kind: SourceKind,
    /// Remote location for non-upload sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Options for the follow-up slideshow render
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slideshow_options: Option<SlideshowOptions>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ProcessSessionJob {
    pub fn new(session_id: SessionId, source_kind: SourceKind) -> Self {
        Self {
            job_id: JobId::new(),
            session_id,
            source_kind,
            source_url: None,
            slideshow_options: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_slideshow_options(mut self, options: Option<SlideshowOptions>) -> Self {
        self.slideshow_options = options;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("ingest:{}", self.session_id)
    }
}

/// Job to render the slideshow of an already-probed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSlideshowJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Session to render
    pub session_id: SessionId,
    /// Render parameters
    pub options: SlideshowOptions,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RenderSlideshowJob {
    pub fn new(session_id: SessionId, options: SlideshowOptions) -> Self {
        Self {
            job_id: JobId::new(),
            session_id,
            options,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    ///
    /// Identical options for the same session collapse; new options render again.
    pub fn idempotency_key(&self) -> String {
        let o = &self.options;
        format!(
            "slideshow:{}:{}:{}:{}:{}",
            self.session_id,
            o.image_duration,
            o.transition_effect,
            o.resolution,
            o.background_music.as_deref().unwrap_or("-")
        )
    }
}

/// Job to run the lifecycle sweeper once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepJob {
    /// Unique job ID
    pub job_id: JobId,
    /// When the sweep was requested
    pub requested_at: DateTime<Utc>,
}

impl SweepJob {
    pub fn new() -> Self {
        Self {
            job_id: JobId::new(),
            requested_at: Utc::now(),
        }
    }

    /// At most one on-demand sweep per minute.
    pub fn idempotency_key(&self) -> String {
        format!("sweep:{}", self.requested_at.format("%Y%m%d%H%M"))
    }
}

impl Default for SweepJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Which stream a job travels on.
///
/// Rendering is heavy and lower priority than getting new sessions browsable,
/// so it has its own stream that workers drain only when ingestion is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLane {
    Ingest,
    Render,
}

impl JobLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLane::Ingest => "ingest",
            JobLane::Render => "render",
        }
    }
}

impl fmt::Display for JobLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Ingestion: fetch or locate the archive, extract, probe, publish the manifest
    ProcessSession(ProcessSessionJob),
    /// Render the slideshow for a ready session
    RenderSlideshow(RenderSlideshowJob),
    /// Run one lifecycle sweep
    Sweep(SweepJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::ProcessSession(j) => &j.job_id,
            QueueJob::RenderSlideshow(j) => &j.job_id,
            QueueJob::Sweep(j) => &j.job_id,
        }
    }

    /// Session the job works on, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            QueueJob::ProcessSession(j) => Some(&j.session_id),
            QueueJob::RenderSlideshow(j) => Some(&j.session_id),
            QueueJob::Sweep(_) => None,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::ProcessSession(j) => j.idempotency_key(),
            QueueJob::RenderSlideshow(j) => j.idempotency_key(),
            QueueJob::Sweep(j) => j.idempotency_key(),
        }
    }

    pub fn lane(&self) -> JobLane {
        match self {
            QueueJob::RenderSlideshow(_) => JobLane::Render,
            QueueJob::ProcessSession(_) | QueueJob::Sweep(_) => JobLane::Ingest,
        }
    }

    /// Short name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::ProcessSession(_) => "process_session",
            QueueJob::RenderSlideshow(_) => "render_slideshow",
            QueueJob::Sweep(_) => "sweep",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showcase_models::TransitionEffect;

    #[test]
    fn queue_job_process_session_serde_roundtrip() {
        let job = ProcessSessionJob::new(SessionId::from_string("s1"), SourceKind::ShareLink)
            .with_source_url("https://drive.google.com/file/d/abc/view");

        let wrapper = QueueJob::ProcessSession(job.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize QueueJob");
        assert!(json.contains("\"type\":\"process_session\""));
        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");

        match decoded {
            QueueJob::ProcessSession(j) => {
                assert_eq!(j.job_id, job.job_id);
                assert_eq!(j.session_id, job.session_id);
                assert_eq!(j.source_kind, SourceKind::ShareLink);
                assert_eq!(j.source_url, job.source_url);
                assert!(j.slideshow_options.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn render_keys_depend_on_options() {
        let id = SessionId::from_string("s1");
        let a = RenderSlideshowJob::new(id.clone(), SlideshowOptions::default());
        let b = RenderSlideshowJob::new(id.clone(), SlideshowOptions::default());
        let c = RenderSlideshowJob::new(
            id,
            SlideshowOptions::default().with_transition(TransitionEffect::Crossfade),
        );
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.idempotency_key(), c.idempotency_key());
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn lanes() {
        let render = QueueJob::RenderSlideshow(RenderSlideshowJob::new(
            SessionId::from_string("s"),
            SlideshowOptions::default(),
        ));
        assert_eq!(render.lane(), JobLane::Render);
        assert_eq!(QueueJob::Sweep(SweepJob::new()).lane(), JobLane::Ingest);
        assert!(QueueJob::Sweep(SweepJob::new()).session_id().is_none());
    }
}
