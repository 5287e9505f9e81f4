use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use expiry_ocr::OcrConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Process-level settings, read from `EXPIRY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Optional TOML file with the recognizer settings.
    pub ocr_config_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind = lookup("EXPIRY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse()
            .with_context(|| format!("EXPIRY_BIND is not a socket address: {bind}"))?;

        let max_upload_bytes = match lookup("EXPIRY_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("EXPIRY_MAX_UPLOAD_BYTES is not a byte count: {raw}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let ocr_config_path = lookup("EXPIRY_CONFIG")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self { bind, ocr_config_path, max_upload_bytes })
    }

    pub fn load_ocr_config(&self) -> Result<OcrConfig> {
        match &self.ocr_config_path {
            Some(path) => OcrConfig::load(path)
                .with_context(|| format!("loading OCR config from {}", path.display())),
            None => Ok(OcrConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let c = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.bind, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(c.ocr_config_path, None);
        assert_eq!(c.load_ocr_config().unwrap(), OcrConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let c = ServerConfig::from_lookup(lookup(&[
            ("EXPIRY_BIND", "127.0.0.1:8080"),
            ("EXPIRY_MAX_UPLOAD_BYTES", "2048"),
            ("EXPIRY_CONFIG", "/etc/expiry/ocr.toml"),
        ]))
        .unwrap();
        assert_eq!(c.bind.port(), 8080);
        assert_eq!(c.max_upload_bytes, 2048);
        assert_eq!(c.ocr_config_path, Some(PathBuf::from("/etc/expiry/ocr.toml")));
    }

    #[test]
    fn rejects_bad_bind() {
        assert!(ServerConfig::from_lookup(lookup(&[("EXPIRY_BIND", "not-an-addr")])).is_err());
    }

    #[test]
    fn rejects_bad_upload_limit() {
        assert!(ServerConfig::from_lookup(lookup(&[("EXPIRY_MAX_UPLOAD_BYTES", "lots")])).is_err());
    }

    #[test]
    fn missing_ocr_config_file_is_error() {
        let c = ServerConfig::from_lookup(lookup(&[("EXPIRY_CONFIG", "/nonexistent/ocr.toml")]))
            .unwrap();
        assert!(c.load_ocr_config().is_err());
    }
}
