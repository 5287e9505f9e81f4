use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::OcrConfig;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available at `{command}`")]
    NotAvailable { command: String },
    #[error("IO error talking to OCR engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over an OCR backend.
/// Implementations accept PNG image bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        (**self).recognize(image_bytes)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string — useful for unit testing the extraction pipeline
/// without requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract CLI backend ─────────────────────────────────────────────────────

/// Shells out to the `tesseract` executable, piping the image over stdin.
pub struct TesseractCli {
    command: PathBuf,
    language: String,
    page_seg_mode: u8,
    engine_mode: u8,
}

impl TesseractCli {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            command: config.tesseract_cmd.clone(),
            language: config.language.clone(),
            page_seg_mode: config.page_seg_mode,
            engine_mode: config.engine_mode,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "stdin".into(),
            "stdout".into(),
            "--oem".into(),
            self.engine_mode.to_string(),
            "--psm".into(),
            self.page_seg_mode.to_string(),
            "-l".into(),
            self.language.clone(),
        ]
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                tracing::warn!("Failed to spawn {}: {e}", self.command.display());
                OcrError::NotAvailable { command: self.command.display().to_string() }
            })?;

        // An engine that bails out early closes its stdin; the exit status
        // and stderr below carry the real cause.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(image_bytes) {
                tracing::debug!("Writing image to {} failed: {e}", self.command.display());
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!("{} ({})", stderr.trim(), output.status)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use crate::config::OcrConfig;
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
        page_seg_mode: u8,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, config: &OcrConfig) -> Self {
            Self {
                data_path,
                lang: config.language.clone(),
                page_seg_mode: config.page_seg_mode,
            }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &self.page_seg_mode.to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
