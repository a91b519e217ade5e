//! Media catalog models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::SessionId;

/// Classified media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A probed media file inside a session directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaFile {
    /// File name as stored on disk
    pub filename: String,
    /// Path relative to the session directory
    pub path: String,
    /// Media type
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Size in bytes
    pub size: u64,
    /// Pixel dimensions (width, height) for images and videos
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    /// Duration in seconds for videos and audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Session-relative thumbnail path (videos only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl MediaFile {
    pub fn new(filename: impl Into<String>, path: impl Into<String>, kind: MediaKind, size: u64) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            kind,
            size,
            dimensions: None,
            duration: None,
            thumbnail: None,
        }
    }

    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

/// Catalog of a session's probed media.
///
/// Lists are sorted by filename. Totals cover images, videos and audio only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    pub session_id: SessionId,
    #[serde(default)]
    pub images: Vec<MediaFile>,
    #[serde(default)]
    pub videos: Vec<MediaFile>,
    #[serde(default)]
    pub audio_files: Vec<MediaFile>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    /// Session-relative path of the rendered slideshow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slideshow_video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slideshow_ready: Option<bool>,
}

impl Manifest {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Record the rendered slideshow.
    pub fn attach_slideshow(&mut self, relative_path: impl Into<String>) {
        self.slideshow_video = Some(relative_path.into());
        self.slideshow_ready = Some(true);
    }

    /// Look up an audio file by filename.
    pub fn find_audio(&self, filename: &str) -> Option<&MediaFile> {
        self.audio_files.iter().find(|f| f.filename == filename)
    }
}
