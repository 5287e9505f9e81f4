use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tesseract page segmentation mode: "assume a single uniform block of text".
pub const DEFAULT_PAGE_SEG_MODE: u8 = 6;
/// Tesseract engine mode: whatever the installed engine supports by default.
pub const DEFAULT_ENGINE_MODE: u8 = 3;
pub const DEFAULT_TESSERACT_CMD: &str = "tesseract";
pub const DEFAULT_LANGUAGE: &str = "eng";
pub const DEFAULT_DEBUG_IMAGE_PATH: &str = "processed.jpg";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings handed to the pipeline at construction time.
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```toml
/// tesseract_cmd = "/usr/local/bin/tesseract"
/// language = "eng"
/// page_seg_mode = 6
/// engine_mode = 3
/// debug_image_path = "processed.jpg"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path or bare name of the `tesseract` executable.
    pub tesseract_cmd: PathBuf,
    pub language: String,
    pub page_seg_mode: u8,
    pub engine_mode: u8,
    /// Where the normalized image is dumped on every run. `None` (an empty
    /// string in TOML) disables it.
    pub debug_image_path: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: PathBuf::from(DEFAULT_TESSERACT_CMD),
            language: DEFAULT_LANGUAGE.to_string(),
            page_seg_mode: DEFAULT_PAGE_SEG_MODE,
            engine_mode: DEFAULT_ENGINE_MODE,
            debug_image_path: Some(PathBuf::from(DEFAULT_DEBUG_IMAGE_PATH)),
        }
    }
}

impl OcrConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_content: &str) -> Result<Self, ConfigError> {
        let mut config: OcrConfig = toml::from_str(toml_content)?;
        if config.debug_image_path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            config.debug_image_path = None;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn without_debug_image(self) -> Self {
        Self { debug_image_path: None, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tesseract_cmd.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("tesseract_cmd must not be empty".into()));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid("language must not be empty".into()));
        }
        if self.page_seg_mode > 13 {
            return Err(ConfigError::Invalid(format!(
                "page_seg_mode {} out of range 0..=13",
                self.page_seg_mode
            )));
        }
        if self.engine_mode > 3 {
            return Err(ConfigError::Invalid(format!(
                "engine_mode {} out of range 0..=3",
                self.engine_mode
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_block_text() {
        let c = OcrConfig::default();
        assert_eq!(c.page_seg_mode, 6);
        assert_eq!(c.engine_mode, 3);
        assert_eq!(c.tesseract_cmd, PathBuf::from("tesseract"));
        assert_eq!(c.debug_image_path, Some(PathBuf::from("processed.jpg")));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(OcrConfig::from_toml_str("").unwrap(), OcrConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let c = OcrConfig::from_toml_str(
            r#"
            tesseract_cmd = "/opt/tesseract/bin/tesseract"
            debug_image_path = "/tmp/label.png"
            "#,
        )
        .unwrap();
        assert_eq!(c.tesseract_cmd, PathBuf::from("/opt/tesseract/bin/tesseract"));
        assert_eq!(c.debug_image_path, Some(PathBuf::from("/tmp/label.png")));
        assert_eq!(c.page_seg_mode, DEFAULT_PAGE_SEG_MODE);
    }

    #[test]
    fn out_of_range_mode_rejected() {
        let err = OcrConfig::from_toml_str("page_seg_mode = 14").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = OcrConfig::from_toml_str("engine_mode = 9").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = OcrConfig::from_toml_str("page_seg_mode = \"six\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocr.toml");
        std::fs::write(&path, "language = \"deu\"\n").unwrap();
        let c = OcrConfig::load(&path).unwrap();
        assert_eq!(c.language, "deu");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = OcrConfig::load(Path::new("/nonexistent/ocr.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn empty_debug_path_disables_artifact() {
        let c = OcrConfig::from_toml_str("debug_image_path = \"\"").unwrap();
        assert_eq!(c.debug_image_path, None);
    }

    #[test]
    fn without_debug_image_clears_path() {
        assert_eq!(OcrConfig::default().without_debug_image().debug_image_path, None);
    }
}
