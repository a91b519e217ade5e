//! Media classification and probing over an extracted session directory.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use showcase_models::encoding::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_CRF, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC,
    THUMBNAIL_DIR, WEB_PIXEL_FORMAT,
};
use showcase_models::{MediaFile, MediaKind};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::formats::{is_ignored_name, MediaFormats};
use crate::fs_utils::{move_file, remove_file_if_exists};
use crate::probe::{probe_audio, probe_video};
use crate::thumbnail::generate_thumbnail;

/// A file that was classified but could not be probed.
#[derive(Debug, Clone)]
pub struct DroppedFile {
    pub filename: String,
    pub reason: String,
}

/// Result of probing one session directory.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub files: Vec<MediaFile>,
    pub dropped: Vec<DroppedFile>,
    /// Files with unknown extensions or ignored names
    pub skipped: usize,
}

/// Probes every media file directly inside a session directory.
#[derive(Debug, Clone, Default)]
pub struct MediaProber {
    formats: MediaFormats,
    runner: FfmpegRunner,
}

impl MediaProber {
    pub fn new(formats: MediaFormats) -> Self {
        Self {
            formats,
            runner: FfmpegRunner::new(),
        }
    }

    /// Use a runner carrying the job's cancellation signal.
    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Probe all regular files in `session_dir`.
    ///
    /// Listing the directory is the only fatal step; per-file failures are
    /// logged and the file is dropped from the report.
    pub async fn probe_dir(&self, session_dir: &Path) -> MediaResult<ProbeReport> {
        let mut candidates = Vec::new();
        let mut report = ProbeReport::default();

        let mut entries = tokio::fs::read_dir(session_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_ignored_name(&name) || !entry.file_type().await?.is_file() {
                report.skipped += 1;
                continue;
            }
            match self.formats.classify(&entry.path()) {
                Some(kind) => candidates.push((name, kind)),
                None => {
                    debug!(file = %name, "Skipping file with unknown extension");
                    report.skipped += 1;
                }
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, kind) in candidates {
            let path = session_dir.join(&name);
            match self.probe_file(session_dir, &path, kind).await {
                Ok(file) => {
                    metrics::counter!("showcase_files_probed_total", "kind" => kind.as_str(), "outcome" => "ok")
                        .increment(1);
                    report.files.push(file);
                }
                Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
                Err(e) => {
                    warn!(file = %name, kind = %kind, "Dropping file after probe failure: {}", e);
                    metrics::counter!("showcase_files_probed_total", "kind" => kind.as_str(), "outcome" => "dropped")
                        .increment(1);
                    report.dropped.push(DroppedFile {
                        filename: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            session_dir = %session_dir.display(),
            probed = report.files.len(),
            dropped = report.dropped.len(),
            skipped = report.skipped,
            "Probing complete"
        );
        Ok(report)
    }

    async fn probe_file(
        &self,
        session_dir: &Path,
        path: &Path,
        kind: MediaKind,
    ) -> MediaResult<MediaFile> {
        match kind {
            MediaKind::Image => probe_image_file(path).await,
            MediaKind::Video => self.probe_video_file(session_dir, path).await,
            MediaKind::Audio => probe_audio_file(path).await,
        }
    }

    async fn probe_video_file(&self, session_dir: &Path, path: &Path) -> MediaResult<MediaFile> {
        let info = probe_video(path).await?;
        let duration = info.duration();

        let web_path = self.normalize_video(session_dir, path).await?;
        let filename = file_name(&web_path)?;
        let size = tokio::fs::metadata(&web_path).await?.len();

        let stem = web_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.clone());
        let thumb_rel = format!("{}/{}.jpg", THUMBNAIL_DIR, stem);
        let thumbnail = match generate_thumbnail(&web_path, session_dir.join(&thumb_rel), duration).await {
            Ok(()) => Some(thumb_rel),
            Err(e) => {
                warn!(file = %filename, "Thumbnail generation failed: {}", e);
                None
            }
        };

        Ok(MediaFile::new(&filename, &filename, MediaKind::Video, size)
            .with_dimensions(info.dimensions())
            .with_duration(duration)
            .with_thumbnail(thumbnail))
    }

    /// Remux into a progressive-download MP4 with AAC audio.
    ///
    /// Stream copy first; re-encode the video when the source codec cannot be
    /// copied into MP4. Non-MP4 sources are replaced by `<stem>.mp4`
    /// (`<stem>_web.mp4` when that name is taken).
    async fn normalize_video(&self, session_dir: &Path, src: &Path) -> MediaResult<PathBuf> {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| MediaError::invalid_media("video without a file name"))?;
        let is_mp4 = src
            .extension()
            .map(|e| e.eq_ignore_ascii_case("mp4"))
            .unwrap_or(false);

        let target = if is_mp4 {
            src.to_path_buf()
        } else {
            free_mp4_name(session_dir, &stem).await?
        };
        let tmp = session_dir.join(format!(".{}.remux.mp4", stem));

        let copy = FfmpegCommand::new(src, &tmp)
            .map("0:v:0")
            .map("0:a:0?")
            .video_codec("copy")
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .audio_bitrate(DEFAULT_AUDIO_BITRATE)
            .faststart();

        if let Err(e) = self.runner.run(&copy).await {
            if matches!(e, MediaError::Cancelled) {
                remove_file_if_exists(&tmp).await?;
                return Err(e);
            }
            debug!(file = %src.display(), "Stream copy failed, re-encoding: {}", e);
            let encode = FfmpegCommand::new(src, &tmp)
                .map("0:v:0")
                .map("0:a:0?")
                .video_codec(DEFAULT_VIDEO_CODEC)
                .preset(DEFAULT_PRESET)
                .crf(DEFAULT_CRF)
                .pixel_format(WEB_PIXEL_FORMAT)
                .audio_codec(DEFAULT_AUDIO_CODEC)
                .audio_bitrate(DEFAULT_AUDIO_BITRATE)
                .faststart();
            if let Err(e) = self.runner.run(&encode).await {
                remove_file_if_exists(&tmp).await?;
                return Err(e);
            }
        }

        move_file(&tmp, &target).await?;
        if target != src {
            remove_file_if_exists(src).await?;
        }
        Ok(target)
    }
}

async fn free_mp4_name(session_dir: &Path, stem: &str) -> MediaResult<PathBuf> {
    let plain = session_dir.join(format!("{}.mp4", stem));
    if !tokio::fs::try_exists(&plain).await? {
        return Ok(plain);
    }
    let mut candidate = session_dir.join(format!("{}_web.mp4", stem));
    let mut n = 1;
    while tokio::fs::try_exists(&candidate).await? {
        candidate = session_dir.join(format!("{}_web_{}.mp4", stem, n));
        n += 1;
    }
    Ok(candidate)
}

async fn probe_image_file(path: &Path) -> MediaResult<MediaFile> {
    let filename = file_name(path)?;
    let size = tokio::fs::metadata(path).await?.len();
    let owned = path.to_path_buf();
    let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&owned)).await??;

    Ok(MediaFile::new(&filename, &filename, MediaKind::Image, size)
        .with_dimensions(Some((width, height))))
}

async fn probe_audio_file(path: &Path) -> MediaResult<MediaFile> {
    let filename = file_name(path)?;
    let size = tokio::fs::metadata(path).await?.len();
    let info = probe_audio(path).await?;

    Ok(MediaFile::new(&filename, &filename, MediaKind::Audio, size).with_duration(info.duration()))
}

fn file_name(path: &Path) -> MediaResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| MediaError::invalid_media(format!("no file name: {}", path.display())))
}
