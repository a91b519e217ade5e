//! Prometheus metrics for the worker.

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

/// Metric names as constants for consistency.
///
/// `showcase_files_probed_total` and `showcase_slideshow_render_seconds` are
/// recorded inside `showcase-media`.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "showcase_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "showcase_jobs_failed_total";
    pub const SWEEP_REMOVED_TOTAL: &str = "showcase_sweep_removed_total";
}

/// Record a job that finished with its intended result.
pub fn record_job_completed(job_kind: &str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "job" => job_kind.to_string()).increment(1);
}

/// Record a job outcome that was not success.
pub fn record_job_failed(job_kind: &str, reason: &str) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "job" => job_kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record sweeper deletions (`what` is `media` or `record`).
pub fn record_sweep_removed(what: &'static str, count: u64) {
    if count > 0 {
        counter!(names::SWEEP_REMOVED_TOTAL, "what" => what).increment(count);
    }
}
