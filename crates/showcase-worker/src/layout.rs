//! On-disk layout of session media.

use std::path::{Path, PathBuf};

use showcase_models::encoding::{INPUT_ARCHIVE_FILENAME, MANIFEST_FILENAME, SLIDESHOW_FILENAME};
use showcase_models::SessionId;

/// `<root>/<session_id>/` holds everything a session owns on disk.
#[derive(Debug, Clone)]
pub struct MediaLayout {
    root: PathBuf,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn archive_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(INPUT_ARCHIVE_FILENAME)
    }

    pub fn manifest_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(MANIFEST_FILENAME)
    }

    pub fn slideshow_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(SLIDESHOW_FILENAME)
    }

    /// Empty the session directory for a fresh ingestion pass, creating it if needed.
    ///
    /// With `keep_archive` the uploaded archive survives the reset.
    pub async fn reset_session_dir(&self, id: &SessionId, keep_archive: bool) -> std::io::Result<()> {
        let dir = self.session_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if keep_archive && entry.file_name() == INPUT_ARCHIVE_FILENAME {
                continue;
            }
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}
