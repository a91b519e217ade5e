//! Shared fixtures for the worker integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use showcase_models::{SessionId, SessionRecord, SessionStatus};
use showcase_queue::{ProcessSessionJob, RenderSlideshowJob, SweepJob};
use showcase_store::{FsSessionStore, SessionStore, StoreResult};
use showcase_worker::{JobDispatcher, MediaLayout, WorkerResult};

/// Dispatcher that keeps every job it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub ingests: Mutex<Vec<ProcessSessionJob>>,
    pub renders: Mutex<Vec<RenderSlideshowJob>>,
    pub sweeps: Mutex<Vec<SweepJob>>,
}

impl RecordingDispatcher {
    pub fn take_renders(&self) -> Vec<RenderSlideshowJob> {
        std::mem::take(&mut *self.renders.lock().unwrap())
    }

    pub fn take_ingests(&self) -> Vec<ProcessSessionJob> {
        std::mem::take(&mut *self.ingests.lock().unwrap())
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch_ingest(&self, job: ProcessSessionJob) -> WorkerResult<()> {
        self.ingests.lock().unwrap().push(job);
        Ok(())
    }

    async fn dispatch_render(&self, job: RenderSlideshowJob) -> WorkerResult<()> {
        self.renders.lock().unwrap().push(job);
        Ok(())
    }

    async fn dispatch_sweep(&self, job: SweepJob) -> WorkerResult<()> {
        self.sweeps.lock().unwrap().push(job);
        Ok(())
    }
}

/// Store wrapper that remembers every (status, progress) it persisted.
pub struct TracingStore {
    inner: FsSessionStore,
    pub history: Mutex<Vec<(SessionStatus, Option<u8>)>>,
}

impl TracingStore {
    pub fn statuses(&self) -> Vec<(SessionStatus, Option<u8>)> {
        self.history.lock().unwrap().clone()
    }

    /// Current stored copy of `record`.
    pub async fn get_record(&self, record: &SessionRecord) -> SessionRecord {
        self.inner.get(&record.id).await.unwrap().unwrap()
    }
}

#[async_trait]
impl SessionStore for TracingStore {
    async fn get(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        self.inner.get(id).await
    }

    async fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        self.history
            .lock()
            .unwrap()
            .push((record.status, record.progress));
        self.inner.put(record).await
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        self.inner.list_ids().await
    }
}

pub struct Env {
    pub root: TempDir,
    pub layout: MediaLayout,
    pub store: Arc<TracingStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub async fn env() -> Env {
    let root = TempDir::new().unwrap();
    let layout = MediaLayout::new(root.path().join("media"));
    let inner = FsSessionStore::open(root.path().join("records")).await.unwrap();
    Env {
        layout,
        store: Arc::new(TracingStore {
            inner,
            history: Mutex::new(Vec::new()),
        }),
        dispatcher: Arc::new(RecordingDispatcher::default()),
        root,
    }
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn jpeg_bytes(rgb: [u8; 3]) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::RgbImage::from_pixel(64, 48, image::Rgb(rgb))
        .write_to(&mut out, image::ImageOutputFormat::Jpeg(90))
        .unwrap();
    out.into_inner()
}
