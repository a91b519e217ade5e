//! Slideshow rendering options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ModelError, ModelResult};

pub const DEFAULT_IMAGE_DURATION: f64 = 3.0;
pub const MIN_IMAGE_DURATION: f64 = 0.5;
pub const MAX_IMAGE_DURATION: f64 = 10.0;
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Transition applied between consecutive slideshow images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEffect {
    None,
    #[default]
    Fade,
    Crossfade,
}

impl TransitionEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionEffect::None => "none",
            TransitionEffect::Fade => "fade",
            TransitionEffect::Crossfade => "crossfade",
        }
    }

    pub fn all() -> &'static [TransitionEffect] {
        &[
            TransitionEffect::None,
            TransitionEffect::Fade,
            TransitionEffect::Crossfade,
        ]
    }
}

impl fmt::Display for TransitionEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransitionEffect {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TransitionEffect::None),
            "fade" => Ok(TransitionEffect::Fade),
            "crossfade" => Ok(TransitionEffect::Crossfade),
            other => Err(ModelError::invalid_options(format!(
                "unknown transition effect: {}",
                other
            ))),
        }
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Resolution {
    #[validate(range(min = 16, max = 3840))]
    pub width: u32,
    #[validate(range(min = 16, max = 2160))]
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round both sides down to even values (required by yuv420p).
    pub fn even(&self) -> Self {
        Self {
            width: self.width & !1,
            height: self.height & !1,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// User-selected slideshow parameters.
///
/// Validated at submission time; the renderer assumes valid input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SlideshowOptions {
    /// Seconds each image stays on screen
    #[serde(default = "default_image_duration")]
    #[validate(range(min = 0.5, max = 10.0))]
    pub image_duration: f64,

    #[serde(default)]
    pub transition_effect: TransitionEffect,

    #[serde(default)]
    pub resolution: Resolution,

    /// Filename of an audio file from the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub background_music: Option<String>,
}

fn default_image_duration() -> f64 {
    DEFAULT_IMAGE_DURATION
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            image_duration: DEFAULT_IMAGE_DURATION,
            transition_effect: TransitionEffect::default(),
            resolution: Resolution::default(),
            background_music: None,
        }
    }
}

impl SlideshowOptions {
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.image_duration = secs;
        self
    }

    pub fn with_transition(mut self, effect: TransitionEffect) -> Self {
        self.transition_effect = effect;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    pub fn with_background_music(mut self, filename: impl Into<String>) -> Self {
        self.background_music = Some(filename.into());
        self
    }

    /// Validate all fields, including the nested resolution.
    pub fn check(&self) -> ModelResult<()> {
        if !self.image_duration.is_finite() {
            return Err(ModelError::invalid_options("image_duration must be finite"));
        }
        self.validate()
            .map_err(|e| ModelError::invalid_options(e.to_string()))?;
        self.resolution
            .validate()
            .map_err(|e| ModelError::invalid_options(e.to_string()))?;
        if let Some(music) = &self.background_music {
            if music.contains('/') || music.contains('\\') || music.contains("..") {
                return Err(ModelError::invalid_options(
                    "background_music must be a plain filename",
                ));
            }
        }
        Ok(())
    }

    /// Parse JSON-encoded options (as submitted alongside an upload) and validate.
    pub fn parse_json(raw: &str) -> ModelResult<Self> {
        let options: SlideshowOptions = serde_json::from_str(raw)
            .map_err(|e| ModelError::invalid_options(e.to_string()))?;
        options.check()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SlideshowOptions::default();
        assert_eq!(options.image_duration, 3.0);
        assert_eq!(options.transition_effect, TransitionEffect::Fade);
        assert_eq!(options.resolution, Resolution::new(1280, 720));
        assert!(options.check().is_ok());
    }

    #[test]
    fn test_duration_bounds() {
        assert!(SlideshowOptions::default().with_duration(0.5).check().is_ok());
        assert!(SlideshowOptions::default().with_duration(10.0).check().is_ok());
        assert!(SlideshowOptions::default().with_duration(0.4).check().is_err());
        assert!(SlideshowOptions::default().with_duration(10.5).check().is_err());
        assert!(SlideshowOptions::default().with_duration(f64::NAN).check().is_err());
    }

    #[test]
    fn test_resolution_bounds() {
        assert!(SlideshowOptions::default().with_resolution(8, 720).check().is_err());
        assert!(SlideshowOptions::default().with_resolution(1920, 1080).check().is_ok());
    }

    #[test]
    fn test_music_must_be_plain_filename() {
        let options = SlideshowOptions::default().with_background_music("../song.mp3");
        assert!(options.check().is_err());
        let options = SlideshowOptions::default().with_background_music("song.mp3");
        assert!(options.check().is_ok());
    }

    #[test]
    fn test_parse_json_fills_defaults() {
        let options = SlideshowOptions::parse_json(r#"{"transition_effect":"none"}"#).unwrap();
        assert_eq!(options.transition_effect, TransitionEffect::None);
        assert_eq!(options.image_duration, 3.0);

        assert!(SlideshowOptions::parse_json(r#"{"transition_effect":"wipe"}"#).is_err());
        assert!(SlideshowOptions::parse_json(r#"{"image_duration":42}"#).is_err());
    }

    #[test]
    fn test_even_resolution() {
        assert_eq!(Resolution::new(1281, 721).even(), Resolution::new(1280, 720));
    }

    #[test]
    fn test_transition_from_str() {
        assert_eq!("Crossfade".parse::<TransitionEffect>().unwrap(), TransitionEffect::Crossfade);
        assert!("wipe".parse::<TransitionEffect>().is_err());
    }
}
