//! Lifecycle sweeper.
//!
//! Two independent passes: media directories of sessions whose media has
//! expired are deleted, then records whose metadata has expired are deleted.
//! Each expiry only ever removes its own half: a record can outlive its
//! media and media can outlive its record. Directories without a record are
//! left alone.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use showcase_models::SessionId;
use showcase_store::SessionStore;

use crate::error::WorkerResult;
use crate::layout::MediaLayout;
use crate::metrics;

/// What one sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub media_removed: Vec<SessionId>,
    pub records_removed: Vec<SessionId>,
    /// Per-item failures; the sweep carries on past them.
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.media_removed.is_empty() && self.records_removed.is_empty()
    }
}

pub struct LifecycleSweeper {
    layout: MediaLayout,
    store: Arc<dyn SessionStore>,
}

impl LifecycleSweeper {
    pub fn new(layout: MediaLayout, store: Arc<dyn SessionStore>) -> Self {
        Self { layout, store }
    }

    /// Run both passes against `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> WorkerResult<SweepReport> {
        let mut report = SweepReport::default();
        if let Err(e) = self.sweep_media(now, &mut report).await {
            warn!(error = %e, "Media pass aborted");
            report.errors += 1;
        }
        if let Err(e) = self.sweep_records(now, &mut report).await {
            warn!(error = %e, "Record pass aborted");
            report.errors += 1;
        }
        report.media_removed.sort();

        metrics::record_sweep_removed("media", report.media_removed.len() as u64);
        metrics::record_sweep_removed("records", report.records_removed.len() as u64);
        info!(
            media_removed = report.media_removed.len(),
            records_removed = report.records_removed.len(),
            errors = report.errors,
            "Sweep finished"
        );
        Ok(report)
    }

    async fn sweep_media(&self, now: DateTime<Utc>, report: &mut SweepReport) -> WorkerResult<()> {
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read media directory entry");
                    report.errors += 1;
                    break;
                }
            };
            match entry.file_type().await {
                Ok(t) if t.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to stat media entry");
                    report.errors += 1;
                    continue;
                }
            }
            let name = entry.file_name();
            let Ok(id) = SessionId::parse(&name.to_string_lossy()) else {
                continue;
            };

            let record = match self.store.get(&id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(session_id = %id, "Media directory has no record, leaving it");
                    continue;
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to read session record");
                    report.errors += 1;
                    continue;
                }
            };
            if !record.media_expired(now) {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    info!(session_id = %id, "Removed expired media");
                    report.media_removed.push(id);
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to remove expired media");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn sweep_records(&self, now: DateTime<Utc>, report: &mut SweepReport) -> WorkerResult<()> {
        for id in self.store.list_ids().await? {
            let expired = match self.store.get(&id).await {
                Ok(Some(record)) => record.metadata_expired(now),
                Ok(None) => false,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to read session record");
                    report.errors += 1;
                    continue;
                }
            };
            if !expired {
                continue;
            }

            match self.store.delete(&id).await {
                Ok(true) => {
                    info!(session_id = %id, "Removed expired session record");
                    report.records_removed.push(id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to delete session record");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }
}
