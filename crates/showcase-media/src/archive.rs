//! Secure ZIP extraction into a session directory.
//!
//! Extraction happens in two passes over the central directory. The first
//! pass applies the quota rules to every entry and writes nothing; the
//! second flattens each regular entry to its sanitized basename and copies
//! it out, enforcing the byte cap on the actual decompressed stream.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use showcase_models::encoding::{INPUT_ARCHIVE_FILENAME, MANIFEST_FILENAME, SLIDESHOW_FILENAME};

use crate::error::IngestError;
use crate::quota::{QuotaPolicy, QuotaViolation, RunningTotals, ViolationKind};
use crate::sanitize::{entry_basename, sanitize_filename, MAX_FILENAME_BYTES};

/// Names the pipeline writes itself; archive entries never take them.
const RESERVED_NAMES: &[&str] = &[INPUT_ARCHIVE_FILENAME, MANIFEST_FILENAME, SLIDESHOW_FILENAME];

/// Outcome of a successful extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Filenames created in the session directory, in archive order
    pub files: Vec<String>,
    /// Entries seen in the archive (including skipped ones)
    pub entries_scanned: usize,
    /// Directories, symlinks and metadata entries not written
    pub entries_skipped: usize,
    /// Decompressed bytes written
    pub bytes_written: u64,
}

/// Unpacks archives under a [`QuotaPolicy`].
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    policy: QuotaPolicy,
}

impl ArchiveExtractor {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Extract `archive_path` into `session_dir`.
    ///
    /// On success the archive blob is removed. On failure the whole session
    /// directory is removed, so a failed extraction leaves nothing behind.
    pub async fn extract(
        &self,
        archive_path: &Path,
        session_dir: &Path,
    ) -> Result<ExtractionReport, IngestError> {
        let result = self.extract_inner(archive_path, session_dir).await;

        match &result {
            Ok(report) => {
                if let Err(e) = tokio::fs::remove_file(archive_path).await {
                    warn!(
                        archive = %archive_path.display(),
                        "Failed to remove archive after extraction: {}", e
                    );
                }
                info!(
                    session_dir = %session_dir.display(),
                    files = report.files.len(),
                    skipped = report.entries_skipped,
                    bytes = report.bytes_written,
                    "Archive extracted"
                );
            }
            Err(e) => {
                warn!(
                    session_dir = %session_dir.display(),
                    kind = e.kind(),
                    "Extraction failed, removing session directory: {}", e
                );
                if let Err(rm) = tokio::fs::remove_dir_all(session_dir).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            session_dir = %session_dir.display(),
                            "Failed to remove session directory: {}", rm
                        );
                    }
                }
            }
        }

        result
    }

    async fn extract_inner(
        &self,
        archive_path: &Path,
        session_dir: &Path,
    ) -> Result<ExtractionReport, IngestError> {
        let meta = match tokio::fs::metadata(archive_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::MissingArchive(archive_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        self.policy.check_archive_size(meta.len())?;
        tokio::fs::create_dir_all(session_dir).await?;

        let policy = self.policy.clone();
        let archive_path = archive_path.to_path_buf();
        let session_dir = session_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_blocking(&policy, &archive_path, &session_dir))
            .await
            .map_err(|e| IngestError::ArchiveRead(format!("extraction task failed: {}", e)))?
    }
}

/// An entry selected by the pre-scan for writing.
struct PlannedEntry {
    index: usize,
    name: String,
}

fn extract_blocking(
    policy: &QuotaPolicy,
    archive_path: &Path,
    session_dir: &Path,
) -> Result<ExtractionReport, IngestError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let (plan, scanned) = prescan(policy, &mut archive)?;
    debug!(
        entries = scanned,
        planned = plan.len(),
        "Archive pre-scan passed"
    );

    let mut report = ExtractionReport {
        entries_scanned: scanned,
        entries_skipped: scanned - plan.len(),
        ..Default::default()
    };
    let mut used: HashSet<String> = RESERVED_NAMES.iter().map(|s| s.to_string()).collect();

    for entry in plan {
        let base = sanitize_filename(entry_basename(&entry.name));
        let filename = unique_name(&base, &mut used);
        let target = contained_path(session_dir, &filename)?;

        let remaining = policy.max_extracted_bytes.saturating_sub(report.bytes_written);
        let mut zipped = archive.by_index(entry.index)?;
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;
        let copied = std::io::copy(&mut (&mut zipped).take(remaining.saturating_add(1)), &mut out)?;

        report.bytes_written += copied;
        if report.bytes_written > policy.max_extracted_bytes {
            // Declared sizes lied; the stream is larger than the header says.
            return Err(QuotaViolation::new(
                ViolationKind::ExtractedTooLarge,
                format!(
                    "decompressed data exceeds {} bytes",
                    policy.max_extracted_bytes
                ),
            )
            .into());
        }
        report.files.push(filename);
    }

    Ok(report)
}

/// Apply the quota to every entry; return the regular files to extract.
fn prescan<R: Read + std::io::Seek>(
    policy: &QuotaPolicy,
    archive: &mut zip::ZipArchive<R>,
) -> Result<(Vec<PlannedEntry>, usize), IngestError> {
    let mut totals = RunningTotals::default();
    let mut plan = Vec::new();

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();
        let size = entry.size();

        policy.check_entry(&name, size, &totals)?;
        totals.add(size);

        if entry.is_dir() || is_symlink(entry.unix_mode()) || is_metadata_entry(&name) {
            continue;
        }
        plan.push(PlannedEntry { index, name });
    }

    Ok((plan, totals.entries))
}

fn is_symlink(unix_mode: Option<u32>) -> bool {
    unix_mode.map(|m| m & 0o170000 == 0o120000).unwrap_or(false)
}

/// macOS archive metadata that carries no user media.
fn is_metadata_entry(name: &str) -> bool {
    name.split(['/', '\\']).any(|s| s == "__MACOSX")
}

/// Pick a filename not yet used in this extraction, suffixing `_N` on collision.
fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, ext) = match base.rfind('.') {
        Some(idx) if idx > 0 => base.split_at(idx),
        _ => (base, ""),
    };

    let mut n = 1usize;
    loop {
        let suffix = format!("_{}", n);
        let budget = MAX_FILENAME_BYTES.saturating_sub(ext.len() + suffix.len());
        let mut cut = budget.min(stem.len());
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        let candidate = format!("{}{}{}", &stem[..cut], suffix, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Join a sanitized filename to the session directory and re-check containment.
fn contained_path(session_dir: &Path, filename: &str) -> Result<PathBuf, IngestError> {
    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(IngestError::PathEscape(filename.to_string()));
    }
    let target = session_dir.join(filename);
    if target.parent() != Some(session_dir) || target.file_name().is_none() {
        return Err(IngestError::PathEscape(filename.to_string()));
    }
    Ok(target)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    /// Build a zip at `path` from (name, bytes) pairs. Names ending in `/` become directories.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn setup(entries: &[(&str, &[u8])]) -> (TempDir, PathBuf, PathBuf) {
        let root = TempDir::new().unwrap();
        let session_dir = root.path().join("session");
        std::fs::create_dir_all(&session_dir).unwrap();
        let archive = session_dir.join(INPUT_ARCHIVE_FILENAME);
        write_zip(&archive, entries);
        (root, session_dir, archive)
    }

    #[tokio::test]
    async fn test_extracts_and_flattens() {
        let (_root, session_dir, archive) = setup(&[
            ("photos/", b""),
            ("photos/a.jpg", b"aaa"),
            ("photos/2024/b.png", b"bb"),
            ("notes.txt", b"n"),
        ]);

        let report = ArchiveExtractor::new(QuotaPolicy::default())
            .extract(&archive, &session_dir)
            .await
            .unwrap();

        assert_eq!(report.files, vec!["a.jpg", "b.png", "notes.txt"]);
        assert_eq!(report.entries_scanned, 4);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(report.bytes_written, 6);
        assert!(session_dir.join("a.jpg").exists());
        assert!(!archive.exists(), "archive blob should be removed");
    }

    #[tokio::test]
    async fn test_basename_collisions_are_suffixed() {
        let (_root, session_dir, archive) = setup(&[
            ("x/a.jpg", b"1"),
            ("y/a.jpg", b"2"),
            ("manifest.json", b"{}"),
        ]);

        let report = ArchiveExtractor::new(QuotaPolicy::default())
            .extract(&archive, &session_dir)
            .await
            .unwrap();

        assert_eq!(report.files, vec!["a.jpg", "a_1.jpg", "manifest_1.json"]);
        assert_eq!(std::fs::read(session_dir.join("a_1.jpg")).unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_entry_cap_writes_nothing() {
        let (_root, session_dir, archive) =
            setup(&[("a.jpg", b"1"), ("b.jpg", b"2"), ("c.jpg", b"3")]);
        let policy = QuotaPolicy {
            max_entries: 2,
            ..Default::default()
        };

        let err = ArchiveExtractor::new(policy)
            .extract(&archive, &session_dir)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Quota(ref v) if v.kind == ViolationKind::TooManyEntries));
        assert!(!session_dir.exists());
    }

    #[tokio::test]
    async fn test_path_escape_fails_whole_archive() {
        let (root, session_dir, archive) =
            setup(&[("ok.jpg", b"1"), ("../../etc/passwd", b"root:x:0:0")]);

        let err = ArchiveExtractor::new(QuotaPolicy::default())
            .extract(&archive, &session_dir)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::PathEscape(_)));
        assert!(!session_dir.exists());
        assert!(!root.path().join("etc").exists());
    }

    #[tokio::test]
    async fn test_extracted_cap() {
        let big = vec![7u8; 64];
        let (_root, session_dir, archive) = setup(&[("a.bin", &big), ("b.bin", &big)]);
        let policy = QuotaPolicy {
            max_extracted_bytes: 100,
            ..Default::default()
        };

        let err = ArchiveExtractor::new(policy)
            .extract(&archive, &session_dir)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "extracted_too_large");
    }

    #[tokio::test]
    async fn test_archive_size_cap() {
        let (_root, session_dir, archive) = setup(&[("a.jpg", b"1234567890")]);
        let policy = QuotaPolicy {
            max_archive_bytes: 8,
            ..Default::default()
        };
        let err = ArchiveExtractor::new(policy)
            .extract(&archive, &session_dir)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "archive_too_large");
    }

    #[tokio::test]
    async fn test_corrupt_archive() {
        let root = TempDir::new().unwrap();
        let session_dir = root.path().join("s");
        std::fs::create_dir_all(&session_dir).unwrap();
        let archive = session_dir.join(INPUT_ARCHIVE_FILENAME);
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = ArchiveExtractor::new(QuotaPolicy::default())
            .extract(&archive, &session_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ArchiveRead(_)));
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let root = TempDir::new().unwrap();
        let err = ArchiveExtractor::new(QuotaPolicy::default())
            .extract(&root.path().join("nope.zip"), &root.path().join("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingArchive(_)));
    }

    #[test]
    fn test_macos_metadata_skipped() {
        assert!(is_metadata_entry("__MACOSX/._a.jpg"));
        assert!(!is_metadata_entry("photos/a.jpg"));
    }

    #[test]
    fn test_contained_path() {
        let dir = Path::new("/media/s1");
        assert_eq!(contained_path(dir, "a.jpg").unwrap(), PathBuf::from("/media/s1/a.jpg"));
        assert!(contained_path(dir, "..").is_err());
        assert!(contained_path(dir, "").is_err());
    }

    #[test]
    fn test_unique_name_long_stem() {
        let mut used = HashSet::new();
        let base = format!("{}.jpg", "a".repeat(251));
        assert_eq!(unique_name(&base, &mut used), base);
        let second = unique_name(&base, &mut used);
        assert!(second.ends_with("_1.jpg"));
        assert!(second.len() <= MAX_FILENAME_BYTES);
    }
}
