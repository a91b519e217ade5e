//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::quota::QuotaViolation;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors from invoking FFmpeg/FFprobe and reading media files.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<tokio::task::JoinError> for MediaError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", e))
    }
}

/// Fetching a remote archive failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download timed out after {0} seconds")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote file not found (HTTP 404)")]
    NotFound,

    #[error("Access to remote file denied (HTTP 403)")]
    Forbidden,

    #[error("Remote server returned HTTP {0}")]
    Http(u16),

    #[error("Remote file exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Remote file is not a ZIP archive")]
    NotAnArchive,

    #[error("IO error while saving download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// Short machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Connection(_) => "connection",
            DownloadError::NotFound => "not_found",
            DownloadError::Forbidden => "forbidden",
            DownloadError::Http(_) => "http",
            DownloadError::TooLarge { .. } => "too_large",
            DownloadError::InvalidUrl(_) => "invalid_url",
            DownloadError::NotAnArchive => "not_an_archive",
            DownloadError::Io(_) => "io",
        }
    }
}

/// Ingestion (fetch + extraction) failure. Always fatal to the session.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Quota exceeded: {0}")]
    Quota(QuotaViolation),

    #[error("Archive entry escapes the session directory: {0}")]
    PathEscape(String),

    #[error("Could not read archive: {0}")]
    ArchiveRead(String),

    #[error("Archive not found at {0}")]
    MissingArchive(PathBuf),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("IO error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Quota(v) => v.kind.as_str(),
            IngestError::PathEscape(_) => "path_escape",
            IngestError::ArchiveRead(_) => "archive_read",
            IngestError::MissingArchive(_) => "missing_archive",
            IngestError::Download(e) => e.kind(),
            IngestError::Io(_) => "io",
        }
    }
}

impl From<QuotaViolation> for IngestError {
    fn from(v: QuotaViolation) -> Self {
        // Path escapes get their own variant so callers match on one place.
        match v.kind {
            crate::quota::ViolationKind::PathEscape => IngestError::PathEscape(v.detail),
            _ => IngestError::Quota(v),
        }
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(e: zip::result::ZipError) -> Self {
        IngestError::ArchiveRead(e.to_string())
    }
}

/// Slideshow rendering failure. Never fatal to the session.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No images to render")]
    NoImages,

    #[error("None of the images could be prepared for rendering")]
    NoUsableImages,

    #[error("Rendering chunk {index} failed: {source}")]
    ChunkFailed {
        index: usize,
        #[source]
        source: MediaError,
    },

    #[error("Memory ceiling exceeded: {used_mb} MB used, limit {limit_mb} MB")]
    MemoryCeiling { used_mb: u64, limit_mb: u64 },

    #[error("Rendering cancelled")]
    Cancelled,

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl RenderError {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::NoImages => "no_images",
            RenderError::NoUsableImages => "no_usable_images",
            RenderError::ChunkFailed { .. } => "chunk_failed",
            RenderError::MemoryCeiling { .. } => "memory_ceiling",
            RenderError::Cancelled => "cancelled",
            RenderError::Media(_) => "media",
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::Media(MediaError::Io(e))
    }
}
