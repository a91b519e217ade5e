//! Session record and identifiers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::manifest::Manifest;
use crate::slideshow::SlideshowOptions;
use crate::status::SessionStatus;

/// Progress checkpoints written by the pipeline.
pub mod progress {
    pub const QUEUED: u8 = 0;
    pub const DOWNLOADING: u8 = 5;
    pub const EXTRACTING: u8 = 10;
    pub const PROBING: u8 = 50;
    pub const MANIFEST_READY: u8 = 90;
    pub const COMPLETE: u8 = 100;
}

/// Unique identifier for a session.
///
/// Doubles as the name of the session's media directory, so only
/// `[A-Za-z0-9_-]` is accepted when parsing untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string without validation.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parse an id received from outside the process.
    pub fn parse(s: &str) -> ModelResult<Self> {
        let valid = !s.is_empty()
            && s.len() <= 64
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ModelError::InvalidSessionId(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the session's archive comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Archive bytes delivered with the request
    #[default]
    Upload,
    /// Plain http(s) URL
    RemoteUrl,
    /// Vendor share link rewritten to a direct download
    ShareLink,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Upload => "upload",
            SourceKind::RemoteUrl => "remote_url",
            SourceKind::ShareLink => "share_link",
        }
    }

    /// Remote sources pass through `downloading`.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SourceKind::Upload)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable per-session record.
///
/// Fixed schema; every field that may be absent is an explicit `Option`.
/// The two expiries are independent and carry no ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecord {
    pub id: SessionId,

    pub source_kind: SourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    pub submitted_at: DateTime<Utc>,

    /// After this instant the media directory may be deleted
    pub media_expires_at: DateTime<Utc>,

    /// After this instant the record itself may be deleted
    pub metadata_expires_at: DateTime<Utc>,

    #[serde(default)]
    pub status: SessionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slideshow_options: Option<SlideshowOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,

    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a freshly submitted (`queued`) record.
    pub fn new(
        id: SessionId,
        source_kind: SourceKind,
        submitted_at: DateTime<Utc>,
        media_expires_at: DateTime<Utc>,
        metadata_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_kind,
            source_url: None,
            original_filename: None,
            submitted_at,
            media_expires_at,
            metadata_expires_at,
            status: SessionStatus::Queued,
            error: None,
            progress: Some(progress::QUEUED),
            slideshow_options: None,
            manifest: None,
            updated_at: submitted_at,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_original_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = Some(name.into());
        self
    }

    pub fn with_slideshow_options(mut self, options: Option<SlideshowOptions>) -> Self {
        self.slideshow_options = options;
        self
    }

    fn advance(&mut self, next: SessionStatus, progress: Option<u8>) -> ModelResult<()> {
        self.status = self.status.transition(next)?;
        if progress.is_some() {
            self.progress = progress;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `-> downloading` (remote sources only).
    pub fn begin_download(&mut self) -> ModelResult<()> {
        if !self.source_kind.is_remote() {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: SessionStatus::Downloading,
            });
        }
        self.error = None;
        self.advance(SessionStatus::Downloading, Some(progress::DOWNLOADING))
    }

    /// `-> processing` at the given checkpoint.
    pub fn begin_processing(&mut self, progress: u8) -> ModelResult<()> {
        self.error = None;
        self.advance(SessionStatus::Processing, Some(progress.min(99)))
    }

    /// Publish the interim manifest: `-> ready` at 90, no slideshow yet.
    pub fn publish_manifest(&mut self, manifest: Manifest) -> ModelResult<()> {
        self.advance(SessionStatus::Ready, Some(progress::MANIFEST_READY))?;
        self.manifest = Some(manifest);
        Ok(())
    }

    /// Publish a manifest that will never get a slideshow: `-> ready` at 100.
    pub fn publish_final_manifest(&mut self, manifest: Manifest) -> ModelResult<()> {
        self.advance(SessionStatus::Ready, Some(progress::COMPLETE))?;
        self.manifest = Some(manifest);
        Ok(())
    }

    /// `ready -> generating_slideshow`.
    pub fn begin_slideshow(&mut self, options: SlideshowOptions) -> ModelResult<()> {
        self.advance(SessionStatus::GeneratingSlideshow, None)?;
        self.slideshow_options = Some(options);
        self.error = None;
        Ok(())
    }

    /// Attach the rendered slideshow: `generating_slideshow -> ready` at 100.
    pub fn attach_slideshow(&mut self, manifest: Manifest) -> ModelResult<()> {
        self.advance(SessionStatus::Ready, Some(progress::COMPLETE))?;
        self.manifest = Some(manifest);
        self.error = None;
        Ok(())
    }

    /// Record a non-fatal rendering failure; the session stays browsable.
    pub fn record_render_error(&mut self, message: impl Into<String>) -> ModelResult<()> {
        if self.status != SessionStatus::Ready {
            self.advance(SessionStatus::Ready, None)?;
        }
        self.progress = Some(progress::COMPLETE);
        self.error = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `-> failed` with the error recorded.
    pub fn fail(&mut self, message: impl Into<String>) -> ModelResult<()> {
        self.advance(SessionStatus::Failed, None)?;
        self.error = Some(message.into());
        Ok(())
    }

    pub fn media_expired(&self, now: DateTime<Utc>) -> bool {
        self.media_expires_at < now
    }

    pub fn metadata_expired(&self, now: DateTime<Utc>) -> bool {
        self.metadata_expires_at < now
    }

    /// Manifest published with images but no render has started or finished.
    pub fn awaiting_slideshow(&self) -> bool {
        self.status == SessionStatus::Ready
            && self.progress == Some(progress::MANIFEST_READY)
            && self.error.is_none()
            && self.manifest.as_ref().is_some_and(|m| m.has_images())
            && !self.slideshow_ready()
    }

    pub fn slideshow_ready(&self) -> bool {
        self.manifest
            .as_ref()
            .and_then(|m| m.slideshow_ready)
            .unwrap_or(false)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            submitted_at: self.submitted_at,
            media_expires_at: self.media_expires_at,
            original_filename: self.original_filename.clone(),
            slideshow_ready: self.slideshow_ready(),
        }
    }
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSummary {
    pub id: SessionId,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub submitted_at: DateTime<Utc>,
    pub media_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub slideshow_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(kind: SourceKind) -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(
            SessionId::new(),
            kind,
            now,
            now + Duration::days(30),
            now + Duration::days(30),
        )
    }

    fn manifest(id: &SessionId) -> Manifest {
        Manifest {
            session_id: id.clone(),
            images: vec![],
            videos: vec![],
            audio_files: vec![],
            total_files: 0,
            total_size: 0,
            created_at: Utc::now(),
            slideshow_video: None,
            slideshow_ready: None,
        }
    }

    #[test]
    fn test_session_id_parse() {
        assert!(SessionId::parse("3f2a-bc_1").is_ok());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("../etc").is_err());
        assert!(SessionId::parse("a/b").is_err());
    }

    #[test]
    fn test_upload_cannot_download() {
        let mut r = record(SourceKind::Upload);
        assert!(r.begin_download().is_err());
        assert_eq!(r.status, SessionStatus::Queued);
    }

    #[test]
    fn test_checkpoints_with_slideshow() {
        let mut r = record(SourceKind::RemoteUrl);
        r.begin_download().unwrap();
        r.begin_processing(progress::EXTRACTING).unwrap();
        r.begin_processing(progress::PROBING).unwrap();
        r.publish_manifest(manifest(&r.id.clone())).unwrap();
        assert_eq!((r.status, r.progress), (SessionStatus::Ready, Some(90)));

        r.begin_slideshow(SlideshowOptions::default()).unwrap();
        assert_eq!(r.status, SessionStatus::GeneratingSlideshow);

        let mut m = manifest(&r.id.clone());
        m.attach_slideshow("slideshow.mp4");
        r.attach_slideshow(m).unwrap();
        assert_eq!((r.status, r.progress), (SessionStatus::Ready, Some(100)));
        assert!(r.slideshow_ready());
    }

    #[test]
    fn test_render_error_keeps_ready() {
        let mut r = record(SourceKind::Upload);
        r.begin_processing(progress::EXTRACTING).unwrap();
        r.publish_manifest(manifest(&r.id.clone())).unwrap();
        r.begin_slideshow(SlideshowOptions::default()).unwrap();
        r.record_render_error("chunk 0 failed").unwrap();
        assert_eq!(r.status, SessionStatus::Ready);
        assert_eq!(r.error.as_deref(), Some("chunk 0 failed"));
        assert!(r.manifest.is_some());
    }

    #[test]
    fn test_fail_is_final() {
        let mut r = record(SourceKind::Upload);
        r.begin_processing(progress::EXTRACTING).unwrap();
        r.fail("path escape").unwrap();
        assert_eq!(r.status, SessionStatus::Failed);
        assert!(r.begin_processing(progress::EXTRACTING).is_err());
        assert!(r.fail("again").is_err());
    }

    #[test]
    fn test_independent_expiries() {
        let now = Utc::now();
        let mut r = record(SourceKind::Upload);
        r.media_expires_at = now - Duration::hours(1);
        r.metadata_expires_at = now + Duration::hours(1);
        assert!(r.media_expired(now));
        assert!(!r.metadata_expired(now));
    }

    #[test]
    fn test_record_json_omits_absent_fields() {
        let r = record(SourceKind::Upload);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["source_kind"], "upload");
        assert!(json.get("manifest").is_none());
        assert!(json.get("error").is_none());
        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
