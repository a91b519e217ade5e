//! Filesystem backend: one JSON document per session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use showcase_models::{SessionId, SessionRecord};

use crate::error::{StoreError, StoreResult};
use crate::store::SessionStore;

const RECORD_EXTENSION: &str = "json";

/// Stores `<dir>/<session_id>.json`, replaced atomically via a temp file.
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    dir: PathBuf,
}

impl FsSessionStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &SessionId) -> StoreResult<PathBuf> {
        // Ids become file names; reject anything that is not a plain token.
        let id = SessionId::parse(id.as_str()).map_err(|_| StoreError::InvalidKey(id.to_string()))?;
        Ok(self.dir.join(format!("{}.{}", id, RECORD_EXTENSION)))
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn get(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        let path = self.record_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        let path = self.record_path(&record.id)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.id, uuid::Uuid::new_v4().simple()));
        let body = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(session_id = %record.id, status = %record.status, "Stored session record");
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<bool> {
        let path = self.record_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(id) = SessionId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
