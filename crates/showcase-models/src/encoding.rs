//! Encoding and rendering constants.

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor) for rendered slideshows
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Pixel format every browser can decode
pub const WEB_PIXEL_FORMAT: &str = "yuv420p";
/// Moves the moov atom to the front so playback starts before download ends
pub const FASTSTART_FLAGS: &str = "+faststart";

/// Thumbnail generation settings
pub const THUMBNAIL_SCALE_WIDTH: u32 = 480;
/// Offset of the thumbnail frame; skips black leading frames
pub const THUMBNAIL_OFFSET_SECS: f64 = 1.0;
/// Directory (relative to the session directory) holding thumbnails
pub const THUMBNAIL_DIR: &str = ".thumbnails";

/// Slideshow output settings
pub const SLIDESHOW_FPS: u32 = 24;
pub const SLIDESHOW_FILENAME: &str = "slideshow.mp4";
pub const MANIFEST_FILENAME: &str = "manifest.json";
/// Name of the uploaded or downloaded archive inside the session directory
pub const INPUT_ARCHIVE_FILENAME: &str = "input.zip";

/// Background music gain
pub const MUSIC_VOLUME: f64 = 0.3;
/// Length of fade/crossfade ramps
pub const TRANSITION_SECS: f64 = 0.5;
