//! Session processing worker.
//!
//! This crate provides:
//! - The ingestion pipeline (extract, probe, publish manifest)
//! - The slideshow stage, run as its own job
//! - The lifecycle sweeper for media and record expiry
//! - A submission service for creating and querying sessions
//! - The queue-driven job executor with soft and hard time limits

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod slideshow_job;
pub mod submission;
pub mod sweeper;

pub use config::{SessionTtl, TimeLimits, WorkerConfig};
pub use dispatch::JobDispatcher;
pub use error::{JobFailure, SubmitError, WorkerError, WorkerResult};
pub use executor::{run_with_limits, JobExecutor, JobHandlers};
pub use layout::MediaLayout;
pub use logging::JobLogger;
pub use pipeline::{IngestOutcome, SessionPipeline};
pub use slideshow_job::{resolve_music, RenderJobOutcome, SlideshowStage};
pub use submission::{SubmissionService, SubmitResult};
pub use sweeper::{LifecycleSweeper, SweepReport};
