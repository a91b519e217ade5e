//! Worker configuration.

use chrono::Duration as TtlDuration;
use std::path::PathBuf;
use std::time::Duration;

/// Soft and hard wall-clock limits for one job.
///
/// At the soft limit the job is asked to stop (running encoders are killed);
/// at the hard limit it is dropped outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl TimeLimits {
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self {
            soft: soft.min(hard),
            hard,
        }
    }

    pub fn from_secs(soft: u64, hard: u64) -> Self {
        Self::new(Duration::from_secs(soft), Duration::from_secs(hard))
    }
}

/// How long sessions live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    /// Lifetime of the media directory
    pub media: TtlDuration,
    /// Lifetime of the session record
    pub metadata: TtlDuration,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            media: TtlDuration::days(30),
            metadata: TtlDuration::days(30),
        }
    }
}

impl SessionTtl {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            media: std::env::var("SHOWCASE_MEDIA_TTL_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(TtlDuration::days)
                .unwrap_or(defaults.media),
            metadata: std::env::var("SHOWCASE_METADATA_TTL_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(TtlDuration::days)
                .unwrap_or(defaults.metadata),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root holding one directory per session
    pub media_root: PathBuf,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Budget for ingestion (download, extract, probe)
    pub ingest_limits: TimeLimits,
    /// Budget for slideshow rendering
    pub render_limits: TimeLimits,
    /// Period of the lifecycle sweep
    pub sweep_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery).
    /// Must exceed the longest hard limit so running jobs are not reclaimed.
    pub claim_min_idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("data/media"),
            max_concurrent_jobs: 2,
            ingest_limits: TimeLimits::from_secs(1500, 1800),
            render_limits: TimeLimits::from_secs(2700, 3600),
            sweep_interval: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(3900),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            media_root: std::env::var("SHOWCASE_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            ingest_limits: TimeLimits::new(
                secs("SHOWCASE_INGEST_SOFT_LIMIT_SECS", defaults.ingest_limits.soft),
                secs("SHOWCASE_INGEST_HARD_LIMIT_SECS", defaults.ingest_limits.hard),
            ),
            render_limits: TimeLimits::new(
                secs("SHOWCASE_RENDER_SOFT_LIMIT_SECS", defaults.render_limits.soft),
                secs("SHOWCASE_RENDER_HARD_LIMIT_SECS", defaults.render_limits.hard),
            ),
            sweep_interval: secs("SHOWCASE_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle),
        }
    }
}
