//! Video thumbnail generation.

use std::path::Path;

use showcase_models::encoding::{THUMBNAIL_OFFSET_SECS, THUMBNAIL_SCALE_WIDTH};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Offset of the thumbnail frame for a clip of the given duration.
///
/// Clips shorter than the default offset (or of unknown length) use the
/// first frame.
pub fn thumbnail_offset(duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > THUMBNAIL_OFFSET_SECS => THUMBNAIL_OFFSET_SECS,
        _ => 0.0,
    }
}

/// Generate a JPEG thumbnail from a video file.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    duration: Option<f64>,
) -> MediaResult<()> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let cmd = FfmpegCommand::new(video_path.as_ref(), output_path)
        .seek(thumbnail_offset(duration))
        .single_frame()
        .video_filter(thumbnail_filter())
        .output_args(["-q:v", "3"])
        .log_level("error");

    FfmpegRunner::new().run(&cmd).await
}

fn thumbnail_filter() -> String {
    format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH)
}
