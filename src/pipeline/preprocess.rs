//! Frame preprocessing: screenshot → model- and OCR-ready images.
//!
//! Three outputs are derived from every captured frame:
//!
//! | Output | Pipeline | Used by |
//! |--------|----------|---------|
//! | [`vision_frame`] | gray → contrast ×2 → threshold 120 → 640×360 → PNG b64 | vision transcription |
//! | [`ocr_frame`] | gray → contrast ×2 → threshold 140 → PNG bytes | Tesseract |
//! | [`thumbnail`] | 320×180 colour → PNG b64 | cache, classification, summaries |
//!
//! Binarising before transcription strips the player's gradient backgrounds,
//! which otherwise make small text unreadable once downscaled. The thumbnail
//! keeps colour because the cover-slide question is partly about colour.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageError, Luma};
use std::io::Cursor;
use tracing::debug;

pub const VISION_SIZE: (u32, u32) = (640, 360);
pub const THUMBNAIL_SIZE: (u32, u32) = (320, 180);
pub const CONTRAST_FACTOR: f32 = 2.0;
pub const VISION_THRESHOLD: u8 = 120;
pub const OCR_THRESHOLD: u8 = 140;

/// Decode a PNG screenshot.
pub fn decode_frame(png: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(png)
}

/// Stretch intensities away from the mean by `factor` (1.0 = unchanged).
pub fn enhance_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let pixels = (gray.width() as u64 * gray.height() as u64).max(1) as f32;
    let mean = gray.pixels().map(|p| p.0[0] as f32).sum::<f32>() / pixels;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0] as f32;
        Luma([(mean + factor * (v - mean)).round().clamp(0.0, 255.0) as u8])
    })
}

/// Black below `threshold`, white otherwise.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] < threshold {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

fn high_contrast_bw(frame: &DynamicImage, threshold: u8) -> GrayImage {
    let gray = frame.to_luma8();
    binarize(&enhance_contrast(&gray, CONTRAST_FACTOR), threshold)
}

/// Binarised 640×360 frame for vision transcription, base64 PNG.
pub fn vision_frame(frame: &DynamicImage) -> Result<String, ImageError> {
    let bw = high_contrast_bw(frame, VISION_THRESHOLD);
    let resized = imageops::resize(&bw, VISION_SIZE.0, VISION_SIZE.1, FilterType::Lanczos3);
    encode_png_base64(&DynamicImage::ImageLuma8(resized))
}

/// Binarised full-size frame for Tesseract, raw PNG bytes.
pub fn ocr_frame(frame: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let bw = high_contrast_bw(frame, OCR_THRESHOLD);
    encode_png(&DynamicImage::ImageLuma8(bw))
}

/// Small colour thumbnail stored in the cache and sent to the model.
pub fn thumbnail(frame: &DynamicImage) -> Result<String, ImageError> {
    let small = frame.resize_exact(THUMBNAIL_SIZE.0, THUMBNAIL_SIZE.1, FilterType::Lanczos3);
    encode_png_base64(&small)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// PNG-encode and base64-wrap an image.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(b64)
}
