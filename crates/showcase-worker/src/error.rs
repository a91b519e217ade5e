//! Worker error types.
//!
//! [`WorkerError`] covers infrastructure trouble (store, queue, filesystem)
//! and is the only error that makes the queue redeliver a job.
//! [`JobFailure`] is a job's own outcome; it is written into the session
//! record and the job is acknowledged.

use thiserror::Error;

use showcase_media::{DownloadError, IngestError, MediaError, RenderError};
use showcase_models::{ModelError, SessionId, SessionStatus};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] showcase_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] showcase_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Queue(_) | WorkerError::QueueFailed(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

/// Outcome of a job that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
    /// The session cannot proceed; it is marked `failed`.
    #[error("{kind}: {detail}")]
    Fatal { kind: &'static str, detail: String },

    /// The session stays usable; the message is recorded on it.
    #[error("{kind}: {detail}")]
    Recoverable { kind: &'static str, detail: String },
}

impl JobFailure {
    pub fn fatal(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            detail: detail.into(),
        }
    }

    pub fn recoverable(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Recoverable {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobFailure::Fatal { kind, .. } | JobFailure::Recoverable { kind, .. } => kind,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            JobFailure::Fatal { detail, .. } | JobFailure::Recoverable { detail, .. } => detail,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, JobFailure::Fatal { .. })
    }

    /// Hard time limit hit while `stage` was running.
    pub fn timed_out(stage: &str, secs: u64, fatal: bool) -> Self {
        let detail = format!("{} exceeded its {} s time limit", stage, secs);
        if fatal {
            Self::fatal("timeout", detail)
        } else {
            Self::recoverable("timeout", detail)
        }
    }
}

impl From<IngestError> for JobFailure {
    fn from(e: IngestError) -> Self {
        JobFailure::fatal(e.kind(), e.to_string())
    }
}

impl From<DownloadError> for JobFailure {
    fn from(e: DownloadError) -> Self {
        JobFailure::fatal(e.kind(), e.to_string())
    }
}

impl From<RenderError> for JobFailure {
    fn from(e: RenderError) -> Self {
        let detail = match &e {
            RenderError::Cancelled => "slideshow rendering stopped at the soft time limit".to_string(),
            other => other.to_string(),
        };
        JobFailure::recoverable(e.kind(), detail)
    }
}

/// Internal result of one pipeline step: either the job's own failure or
/// an infrastructure error that should propagate to the executor.
#[derive(Debug)]
pub(crate) enum StepError {
    Failure(JobFailure),
    Infra(WorkerError),
}

impl From<JobFailure> for StepError {
    fn from(f: JobFailure) -> Self {
        StepError::Failure(f)
    }
}

impl From<IngestError> for StepError {
    fn from(e: IngestError) -> Self {
        StepError::Failure(e.into())
    }
}

impl From<DownloadError> for StepError {
    fn from(e: DownloadError) -> Self {
        StepError::Failure(e.into())
    }
}

impl From<RenderError> for StepError {
    fn from(e: RenderError) -> Self {
        StepError::Failure(e.into())
    }
}

impl From<WorkerError> for StepError {
    fn from(e: WorkerError) -> Self {
        StepError::Infra(e)
    }
}

impl From<showcase_store::StoreError> for StepError {
    fn from(e: showcase_store::StoreError) -> Self {
        StepError::Infra(e.into())
    }
}

impl From<ModelError> for StepError {
    fn from(e: ModelError) -> Self {
        StepError::Infra(e.into())
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::Infra(e.into())
    }
}

/// Errors returned to callers of the submission service.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Only .zip archives are accepted: {0}")]
    NotAnArchive(String),

    #[error("Archive is too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Invalid request: {0}")]
    Invalid(#[from] ModelError),

    #[error("Invalid source: {0}")]
    InvalidSource(#[from] DownloadError),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session {id} is {status}, not ready for a slideshow")]
    NotReady { id: SessionId, status: SessionStatus },

    #[error("Session {0} has no images")]
    NoImages(SessionId),

    #[error("Media of session {0} has expired")]
    Expired(SessionId),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl From<showcase_store::StoreError> for SubmitError {
    fn from(e: showcase_store::StoreError) -> Self {
        SubmitError::Worker(e.into())
    }
}

impl From<std::io::Error> for SubmitError {
    fn from(e: std::io::Error) -> Self {
        SubmitError::Worker(e.into())
    }
}
