use thiserror::Error;

/// Error produced when an ignore pattern fails to compile.
#[derive(Debug, Error)]
#[error("invalid ignore pattern {pattern:?}: {source}")]
pub struct IgnoreError {
    pattern: String,
    source: globset::Error,
}

impl IgnoreError {
    pub(crate) fn new(pattern: String, source: globset::Error) -> Self {
        Self { pattern, source }
    }

    /// The pattern text that failed to compile.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
