pub mod config;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use config::{ConfigError, OcrConfig};
pub use extract::{clean_text, filter_allowed, find_expiry, substitute_known_errors, Extractor};
pub use pipeline::{ExpiryPipeline, PipelineError};
pub use preprocess::{normalize, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, TesseractCli};
pub use types::{ExpiryDate, ScanResult};
