//! Manifest assembly and the on-disk manifest document.

use chrono::{DateTime, Utc};
use std::path::Path;

use showcase_models::encoding::MANIFEST_FILENAME;
use showcase_models::{Manifest, MediaFile, MediaKind, SessionId};

use crate::error::MediaResult;
use crate::fs_utils::move_file;

/// Collects probed files into a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    session_id: SessionId,
    images: Vec<MediaFile>,
    videos: Vec<MediaFile>,
    audio_files: Vec<MediaFile>,
}

impl ManifestBuilder {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            images: Vec::new(),
            videos: Vec::new(),
            audio_files: Vec::new(),
        }
    }

    pub fn push(&mut self, file: MediaFile) {
        match file.kind {
            MediaKind::Image => self.images.push(file),
            MediaKind::Video => self.videos.push(file),
            MediaKind::Audio => self.audio_files.push(file),
        }
    }

    pub fn extend(mut self, files: impl IntoIterator<Item = MediaFile>) -> Self {
        for file in files {
            self.push(file);
        }
        self
    }

    /// Sort each list by filename and compute totals.
    pub fn build(mut self, created_at: DateTime<Utc>) -> Manifest {
        for list in [&mut self.images, &mut self.videos, &mut self.audio_files] {
            list.sort_by(|a, b| a.filename.cmp(&b.filename));
        }

        let all = || self.images.iter().chain(&self.videos).chain(&self.audio_files);
        let total_files = all().count();
        let total_size = all().map(|f| f.size).sum();

        Manifest {
            session_id: self.session_id,
            images: self.images,
            videos: self.videos,
            audio_files: self.audio_files,
            total_files,
            total_size,
            created_at,
            slideshow_video: None,
            slideshow_ready: None,
        }
    }
}

/// Write `manifest.json` into the session directory (temp file + rename).
pub async fn write_manifest(session_dir: &Path, manifest: &Manifest) -> MediaResult<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    let tmp = session_dir.join(format!(".{}.tmp", MANIFEST_FILENAME));
    tokio::fs::write(&tmp, json).await?;
    move_file(&tmp, session_dir.join(MANIFEST_FILENAME)).await
}

/// Read `manifest.json` from the session directory.
pub async fn read_manifest(session_dir: &Path) -> MediaResult<Manifest> {
    let bytes = tokio::fs::read(session_dir.join(MANIFEST_FILENAME)).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str, kind: MediaKind, size: u64) -> MediaFile {
        MediaFile::new(name, name, kind, size)
    }

    #[test]
    fn test_lists_sorted_regardless_of_input_order() {
        let manifest = ManifestBuilder::new(SessionId::from_string("s"))
            .extend([
                file("c.jpg", MediaKind::Image, 1),
                file("song.mp3", MediaKind::Audio, 5),
                file("a.jpg", MediaKind::Image, 2),
                file("z.mp4", MediaKind::Video, 10),
                file("b.jpg", MediaKind::Image, 3),
                file("m.mp4", MediaKind::Video, 20),
            ])
            .build(Utc::now());

        let names: Vec<_> = manifest.images.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        let names: Vec<_> = manifest.videos.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["m.mp4", "z.mp4"]);
        assert_eq!(manifest.total_files, 6);
        assert_eq!(manifest.total_size, 41);
        assert!(manifest.slideshow_ready.is_none());
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = ManifestBuilder::new(SessionId::from_string("s")).build(Utc::now());
        assert!(!manifest.has_images());
        assert_eq!(manifest.total_files, 0);
        assert_eq!(manifest.total_size, 0);
    }

    #[tokio::test]
    async fn test_manifest_document_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut manifest = ManifestBuilder::new(SessionId::from_string("s"))
            .extend([file("a.jpg", MediaKind::Image, 1)])
            .build(Utc::now());
        write_manifest(dir.path(), &manifest).await.unwrap();

        manifest.attach_slideshow("slideshow.mp4");
        write_manifest(dir.path(), &manifest).await.unwrap();

        let back = read_manifest(dir.path()).await.unwrap();
        assert_eq!(back, manifest);
        assert!(!dir.path().join(".manifest.json.tmp").exists());
    }
}
