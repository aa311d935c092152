use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use pixfolio_core::error::Error as CoreError;
use pixfolio_core::extract::{FeatureExtractor, ImageInput, ModelHandle};
use pixfolio_core::payload::mime_for_extension;

const THUMBNAIL_SIZE: u32 = 64;

/// Colour histogram embedding: `bins` buckets per RGB channel over a small
/// thumbnail, each channel normalised to sum to 1.
pub struct HistogramExtractor {
    bins: usize,
}

impl HistogramExtractor {
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.clamp(1, 256) }
    }
}

impl FeatureExtractor for HistogramExtractor {
    fn extract_features(&self, image: &ImageInput) -> pixfolio_core::error::Result<Vec<f32>> {
        let decoded = image::load_from_memory(&image.bytes).map_err(|e| CoreError::Inference {
            name: image.name.clone(),
            message: e.to_string(),
        })?;
        let rgb = decoded.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();
        Ok(histogram(rgb.as_raw(), self.bins))
    }
}

fn histogram(rgb: &[u8], bins: usize) -> Vec<f32> {
    let mut counts = vec![0u32; bins * 3];
    for pixel in rgb.chunks_exact(3) {
        for (channel, &value) in pixel.iter().enumerate() {
            let bin = value as usize * bins / 256;
            counts[channel * bins + bin] += 1;
        }
    }
    let pixels = (rgb.len() / 3).max(1) as f32;
    counts.into_iter().map(|c| c as f32 / pixels).collect()
}

/// The default embedding model, loaded on first use.
pub fn default_model() -> ModelHandle<HistogramExtractor> {
    ModelHandle::new(|| Ok(HistogramExtractor::new(8)))
}

/// Read an image file into an upload. Dimensions come from the file header.
pub fn load_input(path: &Path) -> Result<ImageInput> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .into_dimensions()
        .with_context(|| format!("reading dimensions of {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    Ok(ImageInput {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        mime: mime_for_extension(ext).to_string(),
        bytes,
        width,
        height,
    })
}

/// True for file extensions the importer picks up.
pub fn is_supported_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp")
    )
}
