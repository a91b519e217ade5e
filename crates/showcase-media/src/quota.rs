//! Archive quota rules.
//!
//! Pure predicates, evaluated over archive metadata before any byte is
//! written to disk.

use serde::{Deserialize, Serialize};
use std::fmt;

const GIB: u64 = 1024 * 1024 * 1024;

/// Limits applied to submitted archives and slideshow renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Maximum number of entries (files and directories) in an archive
    pub max_entries: usize,
    /// Maximum cumulative uncompressed size
    pub max_extracted_bytes: u64,
    /// Maximum size of the archive itself (upload or download)
    pub max_archive_bytes: u64,
    /// Maximum number of images placed in one slideshow
    pub max_slideshow_images: usize,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_extracted_bytes: GIB,
            max_archive_bytes: 2 * GIB,
            max_slideshow_images: 30,
        }
    }
}

impl QuotaPolicy {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: std::env::var("SHOWCASE_MAX_ARCHIVE_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_entries),
            max_extracted_bytes: std::env::var("SHOWCASE_MAX_EXTRACTED_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_extracted_bytes),
            max_archive_bytes: std::env::var("SHOWCASE_MAX_ARCHIVE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_archive_bytes),
            max_slideshow_images: std::env::var("SHOWCASE_MAX_SLIDESHOW_IMAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_slideshow_images),
        }
    }

    /// Check one archive entry against the totals accumulated so far.
    ///
    /// `totals` must not yet include this entry.
    pub fn check_entry(
        &self,
        name: &str,
        declared_size: u64,
        totals: &RunningTotals,
    ) -> Result<(), QuotaViolation> {
        if totals.entries + 1 > self.max_entries {
            return Err(QuotaViolation::new(
                ViolationKind::TooManyEntries,
                format!("archive has more than {} entries", self.max_entries),
            ));
        }
        if is_escaping_name(name) {
            return Err(QuotaViolation::new(ViolationKind::PathEscape, name));
        }
        let bytes = totals.bytes.saturating_add(declared_size);
        if bytes > self.max_extracted_bytes {
            return Err(QuotaViolation::new(
                ViolationKind::ExtractedTooLarge,
                format!(
                    "uncompressed size exceeds {} bytes",
                    self.max_extracted_bytes
                ),
            ));
        }
        Ok(())
    }

    /// Check the archive blob size before opening it.
    pub fn check_archive_size(&self, size: u64) -> Result<(), QuotaViolation> {
        if size > self.max_archive_bytes {
            return Err(QuotaViolation::new(
                ViolationKind::ArchiveTooLarge,
                format!("archive is {} bytes, limit {}", size, self.max_archive_bytes),
            ));
        }
        Ok(())
    }
}

/// Counters accumulated while scanning an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    pub entries: usize,
    pub bytes: u64,
}

impl RunningTotals {
    pub fn add(&mut self, declared_size: u64) {
        self.entries += 1;
        self.bytes = self.bytes.saturating_add(declared_size);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TooManyEntries,
    ExtractedTooLarge,
    ArchiveTooLarge,
    PathEscape,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::TooManyEntries => "too_many_entries",
            ViolationKind::ExtractedTooLarge => "extracted_too_large",
            ViolationKind::ArchiveTooLarge => "archive_too_large",
            ViolationKind::PathEscape => "path_escape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaViolation {
    pub kind: ViolationKind,
    pub detail: String,
}

impl QuotaViolation {
    pub fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

impl std::error::Error for QuotaViolation {}

/// Whether an archive entry name could resolve outside the extraction root.
///
/// Rejects parent segments, absolute paths (either separator) and
/// drive-letter prefixes.
pub fn is_escaping_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    name.split(['/', '\\']).any(|segment| segment == "..")
}
