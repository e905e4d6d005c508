use image::{DynamicImage, ImageError, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;

/// Longest accepted side, in pixels.
pub const MAX_DECODE_DIMENSION: u32 = 16384;
/// Upper bound on decoder allocations for one image.
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty image payload")]
    Empty,
    #[error("Invalid image: {0}")]
    Malformed(#[from] image::ImageError),
    #[error("Invalid image: zero-sized ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
    #[error("Invalid image: too large to decode ({0})")]
    TooLarge(String),
}

/// Limits applied by [`decode_image`].
pub fn default_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Decode raw bytes (JPEG / PNG / WEBP / …) into an RGB image.
/// The format is sniffed from the content, never from a file name.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, DecodeError> {
    decode_image_with_limits(data, default_limits())
}

/// Like [`decode_image`], rejecting images whose header or allocations exceed `limits`
/// before the pixel data is decoded.
pub fn decode_image_with_limits(data: &[u8], limits: Limits) -> Result<DynamicImage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::from)?;
    reader.limits(limits);
    let img = reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => DecodeError::TooLarge(limit.to_string()),
        other => DecodeError::Malformed(other),
    })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::ZeroSized { width: img.width(), height: img.height() });
    }
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}
