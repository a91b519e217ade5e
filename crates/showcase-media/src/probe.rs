//! FFprobe stream information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps); 0 when unknown
    pub fps: f64,
    /// Number of frames in the video stream, when the container records it
    pub frame_count: Option<u64>,
    /// Container duration in seconds
    pub format_duration: Option<f64>,
    /// Video codec
    pub codec: String,
    /// Codec of the first audio stream, if any
    pub audio_codec: Option<String>,
}

impl VideoInfo {
    /// Duration derived from frame count and frame rate.
    ///
    /// Unknown when the frame rate is zero. Falls back to the container
    /// duration when the stream carries no frame count.
    pub fn duration(&self) -> Option<f64> {
        if self.fps <= 0.0 {
            return None;
        }
        match self.frame_count {
            Some(frames) => Some(frames as f64 / self.fps),
            None => self.format_duration,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }
}

/// Audio file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    /// Stream length in time-base units
    pub duration_ts: Option<u64>,
    /// Stream time base, e.g. "1/44100"
    pub time_base: Option<String>,
    pub format_duration: Option<f64>,
}

impl AudioInfo {
    /// Duration from sample count and sample rate, else container duration.
    ///
    /// `duration_ts` counts samples only when the time base is `1/sample_rate`;
    /// otherwise it is scaled by the time base.
    pub fn duration(&self) -> Option<f64> {
        let ts = match self.duration_ts {
            Some(ts) => ts as f64,
            None => return self.format_duration,
        };
        match (self.time_base.as_deref().and_then(parse_rational), self.sample_rate) {
            (Some(tb), _) if tb > 0.0 => Some(ts * tb),
            (None, Some(rate)) if rate > 0 => Some(ts / rate as f64),
            _ => self.format_duration,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    duration_ts: Option<u64>,
    time_base: Option<String>,
}

impl FfprobeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let stdout = run_ffprobe(path.as_ref()).await?;
    parse_video_info(&stdout)
}

/// Probe an audio file for information.
pub async fn probe_audio(path: impl AsRef<Path>) -> MediaResult<AudioInfo> {
    let stdout = run_ffprobe(path.as_ref()).await?;
    parse_audio_info(&stdout)
}

async fn run_ffprobe(path: &Path) -> MediaResult<Vec<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    Ok(output.stdout)
}

fn parse_video_info(json: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.is("video"))
        .ok_or_else(|| MediaError::invalid_media("No video stream found"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .filter(|f| *f > 0.0)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        frame_count: video_stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
        format_duration: format_duration(&probe),
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        audio_codec: probe
            .streams
            .iter()
            .find(|s| s.is("audio"))
            .and_then(|s| s.codec_name.clone()),
    })
}

fn parse_audio_info(json: &[u8]) -> MediaResult<AudioInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.is("audio"))
        .ok_or_else(|| MediaError::invalid_media("No audio stream found"))?;

    Ok(AudioInfo {
        codec: audio_stream.codec_name.clone().unwrap_or_default(),
        sample_rate: audio_stream.sample_rate.as_deref().and_then(|s| s.parse().ok()),
        duration_ts: audio_stream.duration_ts,
        time_base: audio_stream.time_base.clone(),
        format_duration: format_duration(&probe),
    })
}

fn format_duration(probe: &FfprobeOutput) -> Option<f64> {
    probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse a rational string (e.g., "30/1" or "29.97").
fn parse_rational(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
