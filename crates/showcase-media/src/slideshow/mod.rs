//! Chunked, memory-bounded slideshow renderer.
//!
//! A render samples the images down to the cap, re-encodes each one to a
//! bounded JPEG, renders consecutive chunks to temporary videos one after
//! another, and stream-copies the chunks into the final file. All
//! temporaries live in a scratch directory next to the output that is
//! removed however the render ends.

pub mod concat;
pub mod filters;
pub mod optimize;
pub mod sampling;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use showcase_models::encoding::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_CRF, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC,
    MUSIC_VOLUME, SLIDESHOW_FPS, TRANSITION_SECS, WEB_PIXEL_FORMAT,
};
use showcase_models::SlideshowOptions;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, RenderError};
use crate::fs_utils::move_file;
use crate::memory::{MemoryGuard, MemoryProbe, SystemMemoryProbe};
use crate::progress::FfmpegProgress;

use self::concat::{concat_command, concat_list};
use self::filters::{audio_graph, plan_audio_loops, ChunkLayout};
use self::optimize::optimize_image;
use self::sampling::sample_ordered;

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct SlideshowConfig {
    /// Images per chunk
    pub chunk_size: usize,
    /// Images per render; larger sets are sampled down
    pub max_images: usize,
    /// Longest side of an optimized image
    pub max_dimension: u32,
    /// JPEG quality of optimized images
    pub jpeg_quality: u8,
    /// Soft ceiling on resident memory
    pub memory_ceiling_mb: u64,
    pub fps: u32,
    pub transition_secs: f64,
    pub music_volume: f64,
    pub background: String,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            max_images: 30,
            max_dimension: 1920,
            jpeg_quality: 85,
            memory_ceiling_mb: 2048,
            fps: SLIDESHOW_FPS,
            transition_secs: TRANSITION_SECS,
            music_volume: MUSIC_VOLUME,
            background: "black".to_string(),
        }
    }
}

impl SlideshowConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chunk_size: std::env::var("SHOWCASE_SLIDESHOW_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.chunk_size),
            max_images: std::env::var("SHOWCASE_MAX_SLIDESHOW_IMAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_images),
            max_dimension: std::env::var("SHOWCASE_SLIDESHOW_MAX_DIMENSION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_dimension),
            jpeg_quality: std::env::var("SHOWCASE_SLIDESHOW_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            memory_ceiling_mb: std::env::var("SHOWCASE_MEMORY_CEILING_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.memory_ceiling_mb),
            ..defaults
        }
    }
}

/// Background track for a render.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Known length in seconds
    pub duration: Option<f64>,
}

/// Summary of a finished render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// Images that made it into the video, in order
    pub images: Vec<PathBuf>,
    pub chunks: usize,
    /// False when the track was requested but could not be mixed in
    pub with_music: bool,
    /// Nominal length (`images * display duration`)
    pub duration_secs: f64,
    pub elapsed_secs: f64,
}

/// Renders ordered image lists into one video.
#[derive(Clone)]
pub struct SlideshowEngine {
    config: SlideshowConfig,
    runner: FfmpegRunner,
    memory: Arc<dyn MemoryProbe>,
}

impl SlideshowEngine {
    pub fn new(config: SlideshowConfig) -> Self {
        Self {
            config,
            runner: FfmpegRunner::new(),
            memory: Arc::new(SystemMemoryProbe::new()),
        }
    }

    /// Use a runner carrying the job's cancellation signal.
    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = probe;
        self
    }

    pub fn config(&self) -> &SlideshowConfig {
        &self.config
    }

    /// Render `images` (in order) into `output`.
    pub async fn render(
        &self,
        images: &[PathBuf],
        output: &Path,
        options: &SlideshowOptions,
        audio: Option<&AudioTrack>,
    ) -> Result<RenderOutcome, RenderError> {
        if images.is_empty() {
            return Err(RenderError::NoImages);
        }
        let started = Instant::now();

        let selected = {
            let mut rng = rand::rng();
            sample_ordered(images, self.config.max_images, &mut rng)
        };
        if selected.len() < images.len() {
            info!(
                available = images.len(),
                selected = selected.len(),
                "Sampled images down to the render cap"
            );
        }

        let parent = output
            .parent()
            .ok_or_else(|| MediaError::internal("slideshow output has no parent directory"))?;
        // Dropped on every exit path, taking chunks and optimized images with it.
        let scratch = tempfile::Builder::new()
            .prefix(".slideshow-")
            .tempdir_in(parent)?;

        let prepared = self.prepare_images(&selected, scratch.path()).await?;
        if prepared.is_empty() {
            return Err(RenderError::NoUsableImages);
        }

        let layout = ChunkLayout {
            resolution: options.resolution,
            fps: self.config.fps,
            background: self.config.background.clone(),
            image_duration: options.image_duration,
            transition: options.transition_effect,
            transition_secs: self.config.transition_secs,
        };

        let (chunk_files, with_music) = match self
            .render_chunks(&layout, &prepared, audio, scratch.path())
            .await
        {
            Ok(files) => (files, audio.is_some()),
            Err(RenderError::ChunkFailed { index, source }) if audio.is_some() => {
                warn!(chunk = index, error = %source, "Chunk failed with music, rendering without it");
                let files = self
                    .render_chunks(&layout, &prepared, None, scratch.path())
                    .await?;
                (files, false)
            }
            Err(e) => return Err(e),
        };

        let assembled = scratch.path().join("slideshow.mp4");
        let list_file = scratch.path().join("chunks.txt");
        tokio::fs::write(&list_file, concat_list(&chunk_files)).await?;
        self.runner
            .run(&concat_command(&list_file, &assembled))
            .await
            .map_err(|e| match e {
                MediaError::Cancelled => RenderError::Cancelled,
                other => RenderError::Media(other),
            })?;
        move_file(&assembled, output).await?;

        let outcome = RenderOutcome {
            images: prepared.iter().map(|p| p.source.clone()).collect(),
            chunks: chunk_files.len(),
            with_music,
            duration_secs: layout.chunk_duration(prepared.len()),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        metrics::histogram!("showcase_slideshow_render_seconds").record(outcome.elapsed_secs);
        info!(
            output = %output.display(),
            images = outcome.images.len(),
            chunks = outcome.chunks,
            with_music = outcome.with_music,
            duration_secs = outcome.duration_secs,
            elapsed_secs = outcome.elapsed_secs,
            "Slideshow rendered"
        );
        Ok(outcome)
    }

    /// Render consecutive chunks, one encoder at a time.
    async fn render_chunks(
        &self,
        layout: &ChunkLayout,
        prepared: &[PreparedImage],
        audio: Option<&AudioTrack>,
        scratch: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut chunk_files = Vec::new();
        for (index, chunk) in prepared.chunks(chunk_size).enumerate() {
            self.check_memory()?;
            let chunk_path = scratch.join(format!("chunk_{:03}.mp4", index));
            let cmd = self.chunk_command(layout, chunk, audio, &chunk_path);
            debug!(chunk = index, images = chunk.len(), "Rendering chunk");
            let expected_ms = (layout.chunk_duration(chunk.len()) * 1000.0) as i64;
            let report = move |p: FfmpegProgress| {
                if p.is_complete {
                    debug!(chunk = index, speed = p.speed, "Chunk encoded");
                } else {
                    debug!(chunk = index, percent = p.percentage(expected_ms), "Chunk progress");
                }
            };
            self.runner.run_with_progress(&cmd, report).await.map_err(|e| match e {
                MediaError::Cancelled => RenderError::Cancelled,
                source => RenderError::ChunkFailed { index, source },
            })?;
            chunk_files.push(chunk_path);
        }
        Ok(chunk_files)
    }

    fn check_memory(&self) -> Result<(), RenderError> {
        MemoryGuard::new(self.memory.as_ref(), self.config.memory_ceiling_mb)
            .check()
            .map_err(|(used_mb, limit_mb)| {
                warn!(used_mb, limit_mb, "Memory ceiling exceeded, aborting render");
                RenderError::MemoryCeiling { used_mb, limit_mb }
            })
    }

    /// Optimize each image into the scratch directory, skipping unreadable ones.
    async fn prepare_images(
        &self,
        images: &[PathBuf],
        scratch: &Path,
    ) -> Result<Vec<PreparedImage>, RenderError> {
        let mut prepared = Vec::with_capacity(images.len());
        for (i, source) in images.iter().enumerate() {
            self.check_memory()?;
            if self.runner.is_cancelled() {
                return Err(RenderError::Cancelled);
            }

            let dst = scratch.join(format!("img_{:04}.jpg", i));
            let (src, out) = (source.clone(), dst.clone());
            let max_dim = self.config.max_dimension;
            let quality = self.config.jpeg_quality;
            let result =
                tokio::task::spawn_blocking(move || optimize_image(&src, &out, max_dim, quality))
                    .await
                    .map_err(MediaError::from)?;

            match result {
                Ok(_) => prepared.push(PreparedImage {
                    source: source.clone(),
                    optimized: dst,
                }),
                Err(e) => {
                    warn!(image = %source.display(), "Skipping image that could not be prepared: {}", e)
                }
            }
        }
        Ok(prepared)
    }

    fn chunk_command(
        &self,
        layout: &ChunkLayout,
        images: &[PreparedImage],
        audio: Option<&AudioTrack>,
        output: &Path,
    ) -> FfmpegCommand {
        build_chunk_command(
            layout,
            images.iter().map(|p| p.optimized.as_path()),
            audio,
            self.config.music_volume,
            output,
        )
    }
}

#[derive(Debug, Clone)]
struct PreparedImage {
    source: PathBuf,
    optimized: PathBuf,
}

/// FFmpeg invocation rendering one chunk.
pub fn build_chunk_command<'a>(
    layout: &ChunkLayout,
    images: impl IntoIterator<Item = &'a Path>,
    audio: Option<&AudioTrack>,
    music_volume: f64,
    output: &Path,
) -> FfmpegCommand {
    let images: Vec<&Path> = images.into_iter().collect();
    let n = images.len();
    let total = layout.chunk_duration(n);

    let mut cmd = FfmpegCommand::new(images.first().copied().unwrap_or(Path::new("")), output)
        .still_image(layout.input_duration(0, n));
    for (i, image) in images.iter().enumerate().skip(1) {
        cmd = cmd.add_input(image).still_image(layout.input_duration(i, n));
    }

    let mut graph = layout.video_graph(n);
    if let Some(track) = audio {
        cmd = cmd
            .add_input(&track.path)
            .stream_loop(plan_audio_loops(track.duration, total));
        graph.push(';');
        graph.push_str(&audio_graph(n, total, music_volume));
    }

    cmd = cmd.filter_complex(graph).map("[vout]");
    if audio.is_some() {
        cmd = cmd
            .map("[aout]")
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .audio_bitrate(DEFAULT_AUDIO_BITRATE);
    }

    cmd.video_codec(DEFAULT_VIDEO_CODEC)
        .preset(DEFAULT_PRESET)
        .crf(DEFAULT_CRF)
        .pixel_format(WEB_PIXEL_FORMAT)
        .frame_rate(layout.fps)
        .output_arg("-t")
        .output_arg(format!("{:.3}", total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::FixedProbe;
    use crate::probe::probe_video;
    use showcase_models::TransitionEffect;
    use tempfile::TempDir;

    fn layout(transition: TransitionEffect) -> ChunkLayout {
        ChunkLayout {
            resolution: showcase_models::Resolution::new(320, 240),
            fps: 24,
            background: "black".to_string(),
            image_duration: 1.0,
            transition,
            transition_secs: 0.5,
        }
    }

    fn write_images(dir: &Path, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("img{}.png", i));
                image::RgbImage::from_pixel(64 + i as u32 * 8, 48, image::Rgb([(i * 40) as u8, 80, 160]))
                    .save(&path)
                    .unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_chunk_command_with_audio() {
        let images = [Path::new("a.jpg"), Path::new("b.jpg")];
        let track = AudioTrack {
            path: PathBuf::from("song.mp3"),
            duration: Some(0.8),
        };
        let args = build_chunk_command(
            &layout(TransitionEffect::Fade),
            images,
            Some(&track),
            0.3,
            Path::new("chunk.mp4"),
        )
        .build_args()
        .join(" ");

        assert!(args.contains("-loop 1 -t 1.000 -i a.jpg -loop 1 -t 1.000 -i b.jpg -stream_loop 2 -i song.mp3"));
        assert!(args.contains("[2:a]atrim=duration=2.000"));
        assert!(args.contains("-map [vout] -map [aout]"));
        assert!(args.contains("-t 2.000 chunk.mp4"));
    }

    #[test]
    fn test_chunk_command_crossfade_input_lengths() {
        let images = [Path::new("a.jpg"), Path::new("b.jpg"), Path::new("c.jpg")];
        let args = build_chunk_command(&layout(TransitionEffect::Crossfade), images, None, 0.3, Path::new("o.mp4"))
            .build_args()
            .join(" ");
        assert!(args.contains("-t 1.500 -i a.jpg -loop 1 -t 1.500 -i b.jpg -loop 1 -t 1.000 -i c.jpg"));
        assert!(!args.contains("[aout]"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dir = TempDir::new().unwrap();
        let engine = SlideshowEngine::new(SlideshowConfig::default());
        let err = engine
            .render(&[], &dir.path().join("out.mp4"), &SlideshowOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::NoImages));
    }

    #[tokio::test]
    async fn test_no_usable_images_cleans_scratch() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"garbage").unwrap();

        let engine = SlideshowEngine::new(SlideshowConfig::default());
        let err = engine
            .render(&[bad], &dir.path().join("out.mp4"), &SlideshowOptions::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::NoUsableImages));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".slideshow-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_memory_ceiling_aborts() {
        let dir = TempDir::new().unwrap();
        let images = write_images(dir.path(), 2);
        let engine = SlideshowEngine::new(SlideshowConfig {
            memory_ceiling_mb: 10,
            ..Default::default()
        })
        .with_memory_probe(Arc::new(FixedProbe(Some(50 * 1024 * 1024))));

        let err = engine
            .render(&images, &dir.path().join("out.mp4"), &SlideshowOptions::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::MemoryCeiling { used_mb: 50, limit_mb: 10 }));
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_render_duration_matches_image_count() {
        let dir = TempDir::new().unwrap();
        let images = write_images(dir.path(), 3);
        let output = dir.path().join("slideshow.mp4");
        let engine = SlideshowEngine::new(SlideshowConfig {
            chunk_size: 2,
            ..Default::default()
        });
        let options = SlideshowOptions::default()
            .with_duration(1.0)
            .with_transition(TransitionEffect::None)
            .with_resolution(320, 240);

        let outcome = engine.render(&images, &output, &options, None).await.unwrap();

        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.images.len(), 3);
        let info = probe_video(&output).await.unwrap();
        assert_eq!(info.dimensions(), Some((320, 240)));
        let duration = info.duration().or(info.format_duration).unwrap();
        assert!((duration - 3.0).abs() < 0.2, "duration {}", duration);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_render_crossfade_over_cap() {
        let dir = TempDir::new().unwrap();
        let images = write_images(dir.path(), 5);
        let output = dir.path().join("slideshow.mp4");
        let engine = SlideshowEngine::new(SlideshowConfig {
            max_images: 3,
            ..Default::default()
        });
        let options = SlideshowOptions::default()
            .with_duration(1.0)
            .with_transition(TransitionEffect::Crossfade)
            .with_resolution(320, 240);

        let outcome = engine.render(&images, &output, &options, None).await.unwrap();

        assert_eq!(outcome.images.len(), 3);
        assert!(outcome.images.iter().all(|p| images.contains(p)));
        let info = probe_video(&output).await.unwrap();
        let duration = info.duration().or(info.format_duration).unwrap();
        assert!((duration - 3.0).abs() < 0.2, "duration {}", duration);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_undecodable_music_renders_silent() {
        let dir = TempDir::new().unwrap();
        let images = write_images(dir.path(), 2);
        let song = dir.path().join("song.mp3");
        std::fs::write(&song, b"not audio at all").unwrap();
        let track = AudioTrack {
            path: song,
            duration: None,
        };
        let output = dir.path().join("slideshow.mp4");
        let options = SlideshowOptions::default()
            .with_duration(1.0)
            .with_transition(TransitionEffect::None)
            .with_resolution(320, 240);

        let outcome = SlideshowEngine::new(SlideshowConfig::default())
            .render(&images, &output, &options, Some(&track))
            .await
            .unwrap();

        assert!(!outcome.with_music);
        let info = probe_video(&output).await.unwrap();
        let duration = info.duration().or(info.format_duration).unwrap();
        assert!((duration - 2.0).abs() < 0.2, "duration {}", duration);
    }
}
