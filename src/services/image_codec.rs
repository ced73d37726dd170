//! Raster decode / resize / JPEG encode, behind a trait so the resolver can
//! be exercised with a counting double.

use image::{DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 95;

/// Tallest thumbnail relative to its width. Anything narrower than 1:20
/// would need an unbounded resize buffer.
pub const MAX_ASPECT_RATIO: u32 = 20;

#[derive(Debug, Error)]
pub enum ImageCodecError {
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("thumbnail of {width}x{height} exceeds the {max_height}px height bound")]
    TooTall {
        width: u32,
        height: u32,
        max_height: u32,
    },
}

/// Synchronous image work. Callers run it on the blocking pool.
pub trait ImageCodec: Send + Sync + 'static {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ImageCodecError>;

    /// Resize to `width` keeping the aspect ratio and encode as JPEG.
    fn encode_thumbnail(
        &self,
        image: &DynamicImage,
        width: u32,
    ) -> Result<Vec<u8>, ImageCodecError>;
}

/// Proportional height for a fixed target width, never below one pixel.
pub fn scaled_height(src_width: u32, src_height: u32, width: u32) -> u32 {
    if src_width == 0 {
        return 1;
    }
    let height = (width as f64 * src_height as f64 / src_width as f64).round();
    (height as u32).max(1)
}

/// [`ImageCodec`] backed by the `image` crate: format sniffed from content,
/// Lanczos3 resampling, quality-95 JPEG output.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ImageCodecError> {
        image::load_from_memory(data).map_err(ImageCodecError::Decode)
    }

    fn encode_thumbnail(
        &self,
        image: &DynamicImage,
        width: u32,
    ) -> Result<Vec<u8>, ImageCodecError> {
        let (src_width, src_height) = image.dimensions();
        let height = scaled_height(src_width, src_height, width);
        let max_height = width.saturating_mul(MAX_ASPECT_RATIO);
        if height > max_height {
            return Err(ImageCodecError::TooTall {
                width,
                height,
                max_height,
            });
        }
        let resized = image.resize_exact(width, height, FilterType::Lanczos3);

        // JPEG has no alpha channel
        let rgb = resized.to_rgb8();
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(ImageCodecError::Encode)?;
        Ok(buf)
    }
}
