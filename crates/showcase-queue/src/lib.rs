//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job payloads for ingestion, slideshow rendering and sweeps
//! - Enqueueing with idempotency keys
//! - Consumer-group consumption with a priority lane for ingestion
//! - Retry counters and a dead letter stream

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{JobId, JobLane, ProcessSessionJob, QueueJob, RenderSlideshowJob, SweepJob};
pub use queue::{Delivery, JobQueue, QueueConfig};
