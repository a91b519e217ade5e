//! Image pre-optimization before encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::MediaResult;

/// Target size for an image whose longest side may not exceed `max_dim`.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    let scale = max_dim as f64 / width.max(height) as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    (w, h)
}

/// Decode `src`, downscale to `max_dim` when larger, and write an RGB JPEG to `dst`.
///
/// Blocking; call from `spawn_blocking`.
pub fn optimize_image(src: &Path, dst: &Path, max_dim: u32, quality: u8) -> MediaResult<(u32, u32)> {
    let img = image::open(src)?;
    let (width, height) = img.dimensions();
    let (w, h) = fit_within(width, height, max_dim);

    let img = if (w, h) != (width, height) {
        img.resize_exact(w, h, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = img.to_rgb8();

    let mut out = BufWriter::new(File::create(dst)?);
    JpegEncoder::new_with_quality(&mut out, quality).encode(&rgb, w, h, ColorType::Rgb8)?;
    Ok((w, h))
}
