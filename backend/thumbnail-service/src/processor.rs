//! Image collaborator - decodes the source image and produces the thumbnail
//!
//! The handler only talks to the [`ImageProcessor`] and [`ImageEncoder`]
//! traits. [`ThumbnailProcessor`] and [`PngEncoder`] are the production
//! implementations on top of the `image` crate. Both are blocking and are
//! run on the blocking thread pool by the handler.

use crate::error::{EncodingError, ProcessingError};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use tracing::debug;

/// Target bounding box for generated thumbnails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThumbnailOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            width: 200,
            height: 400,
        }
    }
}

/// What the processor learned about the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessingMetadata {
    pub source_format: ImageFormat,
    pub source_width: u32,
    pub source_height: u32,
}

/// Output of [`ImageProcessor::process`].
#[derive(Debug)]
pub struct ProcessedImage {
    pub metadata: ProcessingMetadata,
    pub image: DynamicImage,
}

pub trait ImageProcessor: Send + Sync + 'static {
    fn process(
        &self,
        content: &[u8],
        options: &ThumbnailOptions,
    ) -> Result<ProcessedImage, ProcessingError>;
}

pub trait ImageEncoder: Send + Sync + 'static {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, EncodingError>;
}

/// Scales images down into the bounding box, preserving aspect ratio.
/// Images that already fit are passed through unscaled.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThumbnailProcessor;

impl ImageProcessor for ThumbnailProcessor {
    fn process(
        &self,
        content: &[u8],
        options: &ThumbnailOptions,
    ) -> Result<ProcessedImage, ProcessingError> {
        if content.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }

        let source_format = image::guess_format(content).map_err(classify_image_error)?;
        let img = image::load_from_memory_with_format(content, source_format)
            .map_err(classify_image_error)?;

        let (orig_w, orig_h) = img.dimensions();
        let metadata = ProcessingMetadata {
            source_format,
            source_width: orig_w,
            source_height: orig_h,
        };

        if orig_w <= options.width && orig_h <= options.height {
            debug!(
                width = orig_w,
                height = orig_h,
                "Image already within bounds, keeping original size"
            );
            return Ok(ProcessedImage {
                metadata,
                image: img,
            });
        }

        let (new_w, new_h) = fit_within(orig_w, orig_h, options.width, options.height);
        let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);

        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width = new_w,
            height = new_h,
            "Thumbnail generated"
        );

        Ok(ProcessedImage {
            metadata,
            image: resized,
        })
    }
}

/// Encodes thumbnails as PNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .map_err(|e| EncodingError::new(e.to_string()))?;
        Ok(buf)
    }
}

fn classify_image_error(err: ImageError) -> ProcessingError {
    match err {
        ImageError::Unsupported(e) => ProcessingError::UnsupportedFormat(e.to_string()),
        ImageError::Decoding(e) => ProcessingError::Malformed(e.to_string()),
        ImageError::Limits(e) => ProcessingError::Malformed(e.to_string()),
        ImageError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            ProcessingError::Malformed(e.to_string())
        }
        other => ProcessingError::Internal(other.to_string()),
    }
}

/// Largest size with the source aspect ratio that fits in `max_w` x `max_h`.
/// Never returns a zero dimension.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let (w, h) = (width.max(1) as u64, height.max(1) as u64);
    let (max_w, max_h) = (max_w.max(1) as u64, max_h.max(1) as u64);

    if w * max_h > h * max_w {
        let new_h = (h * max_w + w / 2) / w;
        (max_w as u32, new_h.clamp(1, max_h) as u32)
    } else {
        let new_w = (w * max_h + h / 2) / h;
        (new_w.clamp(1, max_w) as u32, max_h as u32)
    }
}
