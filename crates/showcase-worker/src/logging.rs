//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use showcase_models::SessionId;
use showcase_queue::JobId;

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job id, the session id and the operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    session_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, session_id: &SessionId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            session_id: session_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Logger for work that belongs to no session (sweeps).
    pub fn detached(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            session_id: String::new(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, stage: &str, progress: Option<u8>) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            stage,
            progress,
            "Job progress: {}", stage
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation
        )
    }
}
