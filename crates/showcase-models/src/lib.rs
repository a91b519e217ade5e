//! Shared data models for the media showcase backend.
//!
//! This crate provides Serde-serializable types for:
//! - Session identity, source kinds and the session record
//! - The session status state machine
//! - Media files and the per-session manifest
//! - Slideshow rendering options
//! - Encoding constants shared by the media and worker crates

pub mod encoding;
pub mod error;
pub mod manifest;
pub mod session;
pub mod slideshow;
pub mod status;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use manifest::{Manifest, MediaFile, MediaKind};
pub use session::{SessionId, SessionRecord, SessionSummary, SourceKind};
pub use slideshow::{Resolution, SlideshowOptions, TransitionEffect};
pub use status::SessionStatus;
