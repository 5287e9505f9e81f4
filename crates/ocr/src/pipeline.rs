use std::path::Path;
use thiserror::Error;

use crate::config::OcrConfig;
use crate::extract;
use crate::preprocess::{self, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::ScanResult;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Decoded image has no pixels")]
    EmptyImage,
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Recognition(#[from] OcrError),
}

impl PipelineError {
    /// Whether the submitted bytes were at fault rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Decode(_) | PipelineError::EmptyImage)
    }
}

/// Orchestrates: decode → normalize → (debug dump) → OCR → clean → match.
///
/// Holds no mutable state, so one instance can serve concurrent callers.
pub struct ExpiryPipeline<R: OcrBackend> {
    recognizer: R,
    config: OcrConfig,
}

impl<R: OcrBackend> ExpiryPipeline<R> {
    pub fn new(recognizer: R, config: OcrConfig) -> Self {
        Self { recognizer, config }
    }

    /// Process an image file on disk.
    pub fn process_file(&self, path: &Path) -> Result<ScanResult, PipelineError> {
        let bytes = std::fs::read(path)?;
        self.process_bytes(&bytes)
    }

    /// Process raw encoded image bytes (JPEG / PNG / WEBP / …).
    ///
    /// A label without a readable expiry marker is `Ok` with `expiry: None`.
    pub fn process_bytes(&self, data: &[u8]) -> Result<ScanResult, PipelineError> {
        // 1. Decode. Nothing downstream runs on undecodable input.
        let img = image::load_from_memory(data).map_err(PipelineError::Decode)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PipelineError::EmptyImage);
        }
        tracing::debug!("Decoded {}x{} image ({} bytes)", img.width(), img.height(), data.len());

        // 2. Normalize.
        let normalized = preprocess::normalize(&img);
        self.write_debug_image(&normalized);

        // 3. Run OCR.
        let png = preprocess::encode_as_png(&normalized)?;
        let raw_text = self.recognizer.recognize(&png)?;
        tracing::debug!("Raw OCR text: {raw_text:?}");

        // 4. Clean and match.
        let cleaned_text = extract::clean_text(&raw_text);
        tracing::debug!("Cleaned text: {cleaned_text:?}");
        let expiry = extract::find_expiry(&cleaned_text);

        match &expiry {
            Some(date) => tracing::info!("Extracted expiry date: {date}"),
            None => tracing::info!("No expiry date found"),
        }

        Ok(ScanResult { raw_text, cleaned_text, expiry })
    }

    /// Overwrites the configured debug artifact. Failures are logged, never returned.
    fn write_debug_image(&self, normalized: &image::GrayImage) {
        let Some(path) = &self.config.debug_image_path else {
            return;
        };
        if let Err(e) = normalized.save(path) {
            tracing::warn!("Failed to write debug image {}: {e}", path.display());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
