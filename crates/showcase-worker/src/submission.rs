//! Submission service: the entry points that create and query sessions.
//!
//! Transport-agnostic. Callers hand in bytes or a URL; the service writes the
//! session directory and record, then dispatches the ingestion job.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use showcase_media::download::{direct_download_url, filename_from_url, is_share_link};
use showcase_media::sanitize::sanitize_filename;
use showcase_media::{validate_remote_url, QuotaPolicy};
use showcase_models::{
    ModelError, SessionId, SessionRecord, SessionStatus, SessionSummary, SlideshowOptions, SourceKind,
};
use showcase_queue::{ProcessSessionJob, RenderSlideshowJob, SweepJob};
use showcase_store::SessionStore;

use crate::config::SessionTtl;
use crate::dispatch::JobDispatcher;
use crate::error::{SubmitError, WorkerError};
use crate::layout::MediaLayout;
use crate::slideshow_job::resolve_music;

pub type SubmitResult<T> = Result<T, SubmitError>;

pub struct SubmissionService {
    layout: MediaLayout,
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    quota: QuotaPolicy,
    ttl: SessionTtl,
}

impl SubmissionService {
    pub fn new(layout: MediaLayout, store: Arc<dyn SessionStore>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            layout,
            store,
            dispatcher,
            quota: QuotaPolicy::default(),
            ttl: SessionTtl::default(),
        }
    }

    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_ttl(mut self, ttl: SessionTtl) -> Self {
        self.ttl = ttl;
        self
    }

    fn new_record(&self, kind: SourceKind) -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(
            SessionId::new(),
            kind,
            now,
            now + self.ttl.media,
            now + self.ttl.metadata,
        )
    }

    /// Accept an uploaded archive.
    pub async fn submit_upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
        options: Option<SlideshowOptions>,
    ) -> SubmitResult<SessionRecord> {
        if !original_filename.to_ascii_lowercase().ends_with(".zip") {
            return Err(SubmitError::NotAnArchive(original_filename.to_string()));
        }
        let size = bytes.len() as u64;
        if self.quota.check_archive_size(size).is_err() {
            return Err(SubmitError::TooLarge {
                size,
                limit: self.quota.max_archive_bytes,
            });
        }
        if let Some(options) = &options {
            options.check()?;
        }

        let record = self
            .new_record(SourceKind::Upload)
            .with_original_filename(sanitize_filename(original_filename))
            .with_slideshow_options(options.clone());

        let dir = self.layout.session_dir(&record.id);
        if let Err(e) = write_archive(&self.layout, &record.id, bytes).await {
            warn!(session_id = %record.id, error = %e, "Failed to store upload");
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e.into());
        }

        if let Err(e) = self.store.put(&record).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e.into());
        }

        let job = ProcessSessionJob::new(record.id.clone(), SourceKind::Upload).with_slideshow_options(options);
        self.enqueue(record, job).await
    }

    /// Accept a link to a remote archive.
    ///
    /// A plain URL on a share-link host is treated as a share link.
    pub async fn submit_link(
        &self,
        url: &str,
        kind: SourceKind,
        options: Option<SlideshowOptions>,
    ) -> SubmitResult<SessionRecord> {
        let kind = match kind {
            SourceKind::Upload => {
                return Err(ModelError::invalid_source("uploads carry bytes, not a URL").into());
            }
            SourceKind::RemoteUrl if is_share_link(url) => SourceKind::ShareLink,
            other => other,
        };

        let parsed = validate_remote_url(url)?;
        if kind == SourceKind::ShareLink {
            direct_download_url(parsed.as_str())?;
        }
        if let Some(options) = &options {
            options.check()?;
        }

        let mut record = self
            .new_record(kind)
            .with_source_url(parsed.as_str())
            .with_slideshow_options(options.clone());
        if let Some(name) = filename_from_url(&parsed) {
            record = record.with_original_filename(sanitize_filename(&name));
        }
        self.store.put(&record).await?;

        let job = ProcessSessionJob::new(record.id.clone(), kind)
            .with_source_url(parsed.as_str())
            .with_slideshow_options(options);
        self.enqueue(record, job).await
    }

    async fn enqueue(&self, mut record: SessionRecord, job: ProcessSessionJob) -> SubmitResult<SessionRecord> {
        if let Err(e) = self.dispatcher.dispatch_ingest(job).await {
            warn!(session_id = %record.id, error = %e, "Failed to enqueue ingestion");
            record.fail(format!("enqueue_failed: {}", e))?;
            self.store.put(&record).await?;
            return Err(e.into());
        }
        info!(
            session_id = %record.id,
            source_kind = %record.source_kind,
            "Session submitted"
        );
        Ok(record)
    }

    /// Render (or re-render) the slideshow of a ready session.
    pub async fn request_slideshow(&self, id: &SessionId, options: SlideshowOptions) -> SubmitResult<()> {
        options.check()?;
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SubmitError::NotFound(id.clone()))?;

        if record.status != SessionStatus::Ready {
            return Err(SubmitError::NotReady {
                id: id.clone(),
                status: record.status,
            });
        }
        let manifest = match &record.manifest {
            Some(m) if m.has_images() => m,
            _ => return Err(SubmitError::NoImages(id.clone())),
        };
        if record.media_expired(Utc::now()) {
            return Err(SubmitError::Expired(id.clone()));
        }
        resolve_music(manifest, &options)
            .map_err(|f| SubmitError::Invalid(ModelError::invalid_options(f.detail())))?;

        self.dispatcher
            .dispatch_render(RenderSlideshowJob::new(id.clone(), options))
            .await?;
        info!(session_id = %id, "Slideshow requested");
        Ok(())
    }

    /// Run the lifecycle sweeper now.
    pub async fn request_sweep(&self) -> SubmitResult<()> {
        self.dispatcher.dispatch_sweep(SweepJob::new()).await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &SessionId) -> SubmitResult<Option<SessionRecord>> {
        Ok(self.store.get(id).await?)
    }

    /// Summaries of sessions whose media is still available, newest first.
    pub async fn list_sessions(&self, now: DateTime<Utc>) -> SubmitResult<Vec<SessionSummary>> {
        let mut records: Vec<SessionRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| !r.media_expired(now))
            .collect();
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(records.iter().map(SessionRecord::summary).collect())
    }

    /// Remove a session's record and media. Returns whether anything existed.
    pub async fn delete_session(&self, id: &str) -> SubmitResult<bool> {
        let id = SessionId::parse(id)?;
        let removed_record = self.store.delete(&id).await?;

        let dir = self.layout.session_dir(&id);
        let removed_dir = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(WorkerError::from(e).into()),
        };

        if removed_record || removed_dir {
            info!(session_id = %id, "Session deleted");
        }
        Ok(removed_record || removed_dir)
    }
}

async fn write_archive(layout: &MediaLayout, id: &SessionId, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(layout.session_dir(id)).await?;
    tokio::fs::write(layout.archive_path(id), bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MockJobDispatcher;
    use chrono::Duration;
    use showcase_models::session::progress;
    use showcase_models::{Manifest, MediaFile, MediaKind};
    use showcase_store::FsSessionStore;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        layout: MediaLayout,
        store: Arc<FsSessionStore>,
    }

    async fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let layout = MediaLayout::new(root.path().join("media"));
        let store = Arc::new(FsSessionStore::open(root.path().join("records")).await.unwrap());
        Fixture {
            _root: root,
            layout,
            store,
        }
    }

    fn service(fx: &Fixture, dispatcher: MockJobDispatcher) -> SubmissionService {
        SubmissionService::new(fx.layout.clone(), fx.store.clone(), Arc::new(dispatcher))
    }

    fn accepting() -> MockJobDispatcher {
        let mut dispatcher = MockJobDispatcher::new();
        dispatcher.expect_dispatch_ingest().times(1).returning(|_| Ok(()));
        dispatcher
    }

    #[tokio::test]
    async fn test_upload_writes_archive_and_enqueues() {
        let fx = fixture().await;
        let record = service(&fx, accepting())
            .submit_upload(b"PK\x03\x04", "Holiday.zip", None)
            .await
            .unwrap();

        assert_eq!(record.status, SessionStatus::Queued);
        assert_eq!(record.original_filename.as_deref(), Some("Holiday.zip"));
        assert!(record.media_expires_at > record.submitted_at);
        assert!(fx.layout.archive_path(&record.id).exists());
        assert!(fx.store.get(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_zip_and_oversize() {
        let fx = fixture().await;
        let svc = service(&fx, MockJobDispatcher::new());
        assert!(matches!(
            svc.submit_upload(b"x", "photos.rar", None).await,
            Err(SubmitError::NotAnArchive(_))
        ));

        let svc = svc.with_quota(QuotaPolicy {
            max_archive_bytes: 2,
            ..QuotaPolicy::default()
        });
        assert!(matches!(
            svc.submit_upload(b"PK\x03\x04", "a.zip", None).await,
            Err(SubmitError::TooLarge { size: 4, limit: 2 })
        ));
        assert!(fx.store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_enqueue_marks_session_failed() {
        let fx = fixture().await;
        let mut dispatcher = MockJobDispatcher::new();
        dispatcher
            .expect_dispatch_ingest()
            .returning(|_| Err(WorkerError::queue_failed("redis down")));

        let err = service(&fx, dispatcher)
            .submit_upload(b"PK", "a.zip", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Worker(_)));

        let ids = fx.store.list_ids().await.unwrap();
        let stored = fx.store.get(&ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_link_validation() {
        let fx = fixture().await;
        let svc = service(&fx, MockJobDispatcher::new());
        for bad in ["ftp://example.com/a.zip", "http://127.0.0.1/a.zip", "http://localhost/a.zip"] {
            assert!(matches!(
                svc.submit_link(bad, SourceKind::RemoteUrl, None).await,
                Err(SubmitError::InvalidSource(_))
            ));
        }
        assert!(matches!(
            svc.submit_link("https://example.com/a.zip", SourceKind::Upload, None).await,
            Err(SubmitError::Invalid(_))
        ));
        assert!(matches!(
            svc.submit_link("https://example.com/a.zip", SourceKind::ShareLink, None).await,
            Err(SubmitError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_link_derives_filename_and_detects_share_links() {
        let fx = fixture().await;
        let mut dispatcher = MockJobDispatcher::new();
        dispatcher
            .expect_dispatch_ingest()
            .withf(|job| job.source_kind == SourceKind::ShareLink)
            .times(1)
            .returning(|_| Ok(()));
        dispatcher
            .expect_dispatch_ingest()
            .withf(|job| job.source_kind == SourceKind::RemoteUrl)
            .times(1)
            .returning(|_| Ok(()));
        let svc = service(&fx, dispatcher);

        let plain = svc
            .submit_link("https://example.com/files/Trip.zip", SourceKind::RemoteUrl, None)
            .await
            .unwrap();
        assert_eq!(plain.original_filename.as_deref(), Some("Trip.zip"));

        let share = svc
            .submit_link("https://drive.google.com/file/d/abc123/view", SourceKind::RemoteUrl, None)
            .await
            .unwrap();
        assert_eq!(share.source_kind, SourceKind::ShareLink);
        assert!(share.original_filename.is_none());
    }

    async fn ready_record(fx: &Fixture, images: &[&str], media_days: i64) -> SessionRecord {
        let now = Utc::now();
        let mut record = SessionRecord::new(
            SessionId::new(),
            SourceKind::Upload,
            now,
            now + Duration::days(media_days),
            now + Duration::days(30),
        );
        let files = images.iter().map(|n| MediaFile::new(*n, *n, MediaKind::Image, 1));
        let manifest: Manifest = showcase_media::ManifestBuilder::new(record.id.clone())
            .extend(files)
            .build(now);
        record.begin_processing(progress::PROBING).unwrap();
        record.publish_manifest(manifest).unwrap();
        fx.store.put(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_request_slideshow_checks_session() {
        let fx = fixture().await;
        let mut dispatcher = MockJobDispatcher::new();
        dispatcher.expect_dispatch_render().times(1).returning(|_| Ok(()));
        let svc = service(&fx, dispatcher);

        let ready = ready_record(&fx, &["a.jpg"], 30).await;
        svc.request_slideshow(&ready.id, SlideshowOptions::default()).await.unwrap();

        assert!(matches!(
            svc.request_slideshow(&SessionId::new(), SlideshowOptions::default()).await,
            Err(SubmitError::NotFound(_))
        ));

        let empty = ready_record(&fx, &[], 30).await;
        assert!(matches!(
            svc.request_slideshow(&empty.id, SlideshowOptions::default()).await,
            Err(SubmitError::NoImages(_))
        ));

        let expired = ready_record(&fx, &["a.jpg"], -1).await;
        assert!(matches!(
            svc.request_slideshow(&expired.id, SlideshowOptions::default()).await,
            Err(SubmitError::Expired(_))
        ));

        let music = SlideshowOptions::default().with_background_music("missing.mp3");
        assert!(matches!(
            svc.request_slideshow(&ready.id, music).await,
            Err(SubmitError::Invalid(_))
        ));

        let bad = SlideshowOptions::default().with_duration(0.0);
        assert!(matches!(
            svc.request_slideshow(&ready.id, bad).await,
            Err(SubmitError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_list_hides_expired_media_and_delete_removes_both() {
        let fx = fixture().await;
        let svc = service(&fx, MockJobDispatcher::new());
        let live = ready_record(&fx, &["a.jpg"], 30).await;
        let gone = ready_record(&fx, &["a.jpg"], -1).await;
        std::fs::create_dir_all(fx.layout.session_dir(&live.id)).unwrap();

        let listed = svc.list_sessions(Utc::now()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, live.id);

        assert!(svc.get_session(&gone.id).await.unwrap().is_some());

        assert!(svc.delete_session(live.id.as_str()).await.unwrap());
        assert!(!fx.layout.session_dir(&live.id).exists());
        assert!(svc.get_session(&live.id).await.unwrap().is_none());
        assert!(!svc.delete_session(live.id.as_str()).await.unwrap());
        assert!(matches!(
            svc.delete_session("../etc").await,
            Err(SubmitError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_request_sweep_dispatches() {
        let fx = fixture().await;
        let mut dispatcher = MockJobDispatcher::new();
        dispatcher.expect_dispatch_sweep().times(1).returning(|_| Ok(()));
        service(&fx, dispatcher).request_sweep().await.unwrap();
    }
}
