//! Extension-based media classification.

use std::path::Path;

use showcase_models::encoding::{
    INPUT_ARCHIVE_FILENAME, MANIFEST_FILENAME, SLIDESHOW_FILENAME, THUMBNAIL_DIR,
};
use showcase_models::MediaKind;

/// Extension allow-lists (lowercase, without the dot).
#[derive(Debug, Clone)]
pub struct MediaFormats {
    pub image: Vec<String>,
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl Default for MediaFormats {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            image: owned(&["jpg", "jpeg", "png", "gif", "bmp", "webp"]),
            video: owned(&["mp4", "webm", "avi", "mov", "mkv"]),
            audio: owned(&["mp3", "wav", "ogg", "aac", "flac"]),
        }
    }
}

impl MediaFormats {
    /// Classify a file by extension; `None` for anything not allow-listed.
    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.image.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.video.contains(&ext) {
            Some(MediaKind::Video)
        } else if self.audio.contains(&ext) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// Files the prober never looks at: hidden files, resource-fork shadows and
/// artifacts the pipeline writes itself.
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.')
        || name == "__MACOSX"
        || name == "Thumbs.db"
        || name == THUMBNAIL_DIR
        || name == MANIFEST_FILENAME
        || name == SLIDESHOW_FILENAME
        || name == INPUT_ARCHIVE_FILENAME
        || name.ends_with(".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_case_insensitive() {
        let formats = MediaFormats::default();
        assert_eq!(formats.classify(Path::new("a.JPG")), Some(MediaKind::Image));
        assert_eq!(formats.classify(Path::new("b.webp")), Some(MediaKind::Image));
        assert_eq!(formats.classify(Path::new("c.MOV")), Some(MediaKind::Video));
        assert_eq!(formats.classify(Path::new("d.flac")), Some(MediaKind::Audio));
        assert_eq!(formats.classify(Path::new("e.txt")), None);
        assert_eq!(formats.classify(Path::new("noext")), None);
    }

    #[test]
    fn test_ignored_names() {
        assert!(is_ignored_name("._photo.jpg"));
        assert!(is_ignored_name(".DS_Store"));
        assert!(is_ignored_name(".thumbnails"));
        assert!(is_ignored_name("manifest.json"));
        assert!(is_ignored_name("slideshow.mp4"));
        assert!(!is_ignored_name("photo.jpg"));
    }
}
