//! Image decoding and normalization for uploaded photos.
//!
//! Uploads arrive base64 encoded, optionally as a data URL. They are decoded,
//! checked against a minimum size, downscaled so the long side fits the
//! configured maximum and re-encoded as PNG for the provider.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use fixit_core::config::PipelineConfig;
use fixit_core::{Error, ImagePart, Result};

/// Decodes uploads into provider-ready images.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_dimension: u32,
    min_dimension: u32,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(1024, 50)
    }
}

impl From<&PipelineConfig> for ImageProcessor {
    fn from(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.max_image_dimension, cfg.min_image_dimension)
    }
}

impl ImageProcessor {
    pub fn new(max_dimension: u32, min_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            min_dimension,
        }
    }

    /// Full pipeline: decode, validate, resize, re-encode.
    pub fn process(&self, encoded: &str) -> Result<ImagePart> {
        let bytes = decode_base64(encoded)?;
        let img = image::load_from_memory(&bytes).map_err(|e| Error::invalid_image(e.to_string()))?;

        let (width, height) = img.dimensions();
        if width < self.min_dimension || height < self.min_dimension {
            return Err(Error::invalid_image(format!(
                "Image too small ({}x{}, minimum {} px)",
                width, height, self.min_dimension
            )));
        }

        let img = self.resize_if_needed(img);
        let (width, height) = img.dimensions();

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| Error::internal(format!("PNG encode failed: {}", e)))?;

        tracing::debug!(width, height, bytes = png.len(), "Image normalized");
        Ok(ImagePart::new("image/png", png, width, height))
    }

    fn resize_if_needed(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let max = self.max_dimension;
        if width <= max && height <= max {
            return img;
        }

        let (new_width, new_height) = if width > height {
            (max, scaled(height, max, width))
        } else {
            (scaled(width, max, height), max)
        };

        tracing::info!(width, height, new_width, new_height, "Resizing image");
        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

/// `side * max / long`, truncated, never zero.
fn scaled(side: u32, max: u32, long: u32) -> u32 {
    ((u64::from(side) * u64::from(max) / u64::from(long)) as u32).max(1)
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((_, data)) => data,
        None => encoded,
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(Error::invalid_image("Invalid image data"));
    }

    BASE64
        .decode(payload.as_bytes())
        .map_err(|e| Error::invalid_image(format!("Invalid image data: {}", e)))
}
