//! Best-effort recompression of oversized images.
//!
//! Oversized attachments are recompressed in their original format before
//! upload; the format is never converted. JPEGs are re-encoded at
//! stepped-down quality, PNGs are re-encoded at maximum compression and
//! progressively downscaled. Anything that is not a JPEG or PNG, fails to
//! decode, or does not actually shrink is uploaded as-is.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// JPEG re-encode qualities, tried in order until the result fits.
const JPEG_QUALITIES: &[u8] = &[85, 75, 65, 55, 45, 35, 25];

/// PNG downscale passes allowed after the plain re-encode.
const PNG_DOWNSCALE_PASSES: u32 = 3;

/// Recompress `bytes` if it is an image larger than `threshold`. Returns
/// the smaller of the recompressed and original encodings.
pub fn compress_if_needed(bytes: Vec<u8>, threshold: u64) -> Vec<u8> {
    if bytes.len() as u64 <= threshold {
        return bytes;
    }
    let format = match image::guess_format(&bytes) {
        Ok(f) => f,
        Err(_) => return bytes,
    };
    let decoded = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(_) => return bytes,
    };

    let recompressed = match format {
        ImageFormat::Jpeg => compress_jpeg(&decoded, threshold),
        ImageFormat::Png => compress_png(decoded, threshold),
        _ => None,
    };

    match recompressed {
        Some(out) if out.len() < bytes.len() => {
            debug!(
                from = bytes.len(),
                to = out.len(),
                "Recompressed oversized image"
            );
            out
        }
        _ => bytes,
    }
}

fn compress_jpeg(img: &DynamicImage, threshold: u64) -> Option<Vec<u8>> {
    let mut best: Option<Vec<u8>> = None;
    for &quality in JPEG_QUALITIES {
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), quality);
        if img.write_with_encoder(encoder).is_err() {
            return best;
        }
        let fits = out.len() as u64 <= threshold;
        if best.as_ref().map(|b| out.len() < b.len()).unwrap_or(true) {
            best = Some(out);
        }
        if fits {
            break;
        }
    }
    best
}

fn compress_png(mut img: DynamicImage, threshold: u64) -> Option<Vec<u8>> {
    let mut best: Option<Vec<u8>> = None;
    for pass in 0..=PNG_DOWNSCALE_PASSES {
        if pass > 0 {
            let (w, h) = (img.width(), img.height());
            if w < 8 || h < 8 {
                break;
            }
            img = img.resize(w * 3 / 4, h * 3 / 4, ResizeFilter::Triangle);
        }
        let mut out = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            Cursor::new(&mut out),
            CompressionType::Best,
            FilterType::Adaptive,
        );
        if img.write_with_encoder(encoder).is_err() {
            return best;
        }
        let fits = out.len() as u64 <= threshold;
        if best.as_ref().map(|b| out.len() < b.len()).unwrap_or(true) {
            best = Some(out);
        }
        if fits {
            break;
        }
    }
    best
}
