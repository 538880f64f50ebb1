//! Thumbnail generation for preview images.
//!
//! Reads only the image header first so oversized images are rejected before
//! any pixel buffer is allocated (decompression bombs), then decodes, shrinks
//! with Lanczos3 and re-encodes as JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Limits};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("Unrecognised image format")]
    UnknownFormat,
    #[error("Image dimensions too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },
    #[error("Image decode failed: {0}")]
    DecodeFailed(String),
    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),
}

/// Thumbnail parameters.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailOptions {
    /// Largest accepted source width or height.
    pub max_source_dim: u32,
    /// Bounding box of the thumbnail.
    pub size: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_source_dim: 4000,
            size: 100,
            quality: 80,
        }
    }
}

fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ThumbnailError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ThumbnailError::DecodeFailed(e.to_string()))?;
    if reader.format().is_none() {
        return Err(ThumbnailError::UnknownFormat);
    }
    Ok(reader)
}

/// Read width and height from the image header without decoding pixels.
pub fn dimensions(data: &[u8]) -> Result<(u32, u32), ThumbnailError> {
    reader(data)?
        .into_dimensions()
        .map_err(|e| ThumbnailError::DecodeFailed(e.to_string()))
}

/// Produce a JPEG thumbnail fitting inside `opts.size` x `opts.size`.
///
/// This function is CPU-bound and should be called inside `spawn_blocking`.
pub fn make_thumbnail(data: &[u8], opts: &ThumbnailOptions) -> Result<Vec<u8>, ThumbnailError> {
    let (width, height) = dimensions(data)?;
    if width > opts.max_source_dim || height > opts.max_source_dim {
        return Err(ThumbnailError::TooLarge { width, height });
    }

    let mut reader = reader(data)?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(opts.max_source_dim);
    limits.max_image_height = Some(opts.max_source_dim);
    reader.limits(limits);

    let img = reader
        .decode()
        .map_err(|e| ThumbnailError::DecodeFailed(e.to_string()))?;

    // Never upscale small images
    let (w, h) = img.dimensions();
    let thumb = if w <= opts.size && h <= opts.size {
        img
    } else {
        img.resize(opts.size, opts.size, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(thumb.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, opts.quality))
        .map_err(|e| ThumbnailError::EncodeFailed(e.to_string()))?;

    Ok(buf)
}
