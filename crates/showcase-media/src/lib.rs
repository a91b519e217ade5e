#![deny(unreachable_patterns)]
//! Media handling for session archives.
//!
//! This crate provides:
//! - Quota-enforcing, path-safe ZIP extraction
//! - Remote archive download with share-link rewriting
//! - Media classification, probing, web remuxing and thumbnails
//! - Manifest building and atomic persistence
//! - A chunked, memory-bounded slideshow renderer on top of FFmpeg

pub mod archive;
pub mod command;
pub mod download;
pub mod error;
pub mod formats;
pub mod fs_utils;
pub mod manifest;
pub mod memory;
pub mod probe;
pub mod prober;
pub mod progress;
pub mod quota;
pub mod sanitize;
pub mod slideshow;
pub mod thumbnail;

pub use archive::{ArchiveExtractor, ExtractionReport};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{validate_remote_url, ArchiveFetcher, DownloadConfig, HttpFetcher};
pub use error::{DownloadError, IngestError, MediaError, MediaResult, RenderError};
pub use formats::MediaFormats;
pub use manifest::{read_manifest, write_manifest, ManifestBuilder};
pub use memory::{MemoryProbe, SystemMemoryProbe};
pub use probe::{probe_audio, probe_video, AudioInfo, VideoInfo};
pub use prober::{DroppedFile, MediaProber, ProbeReport};
pub use quota::{QuotaPolicy, QuotaViolation, ViolationKind};
pub use slideshow::{AudioTrack, RenderOutcome, SlideshowConfig, SlideshowEngine};
