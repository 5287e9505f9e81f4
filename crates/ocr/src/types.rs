use serde::Serialize;

/// A date token lifted verbatim from label text, e.g. `15/08/26` or `1-9-2026`.
///
/// Digit groupings and separators are kept exactly as printed; no calendar
/// validation is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExpiryDate(String);

impl ExpiryDate {
    pub(crate) fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ExpiryDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExpiryDate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Everything a single pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Text exactly as the recognizer returned it.
    pub raw_text: String,
    /// Text after known-error substitution and character filtering.
    pub cleaned_text: String,
    /// `None` means the label was read but carried no recognizable expiry marker.
    pub expiry: Option<ExpiryDate>,
}

impl ScanResult {
    pub fn found(&self) -> bool {
        self.expiry.is_some()
    }
}
