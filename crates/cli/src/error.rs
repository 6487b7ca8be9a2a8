use thiserror::Error;

/// Errors surfaced by the command-line frontend.
#[derive(Debug, Error)]
pub enum CliError {
    /// A spec string could not be parsed or is unsupported.
    #[error("{0}")]
    Spec(String),

    /// Ignore rules failed to compile.
    #[error(transparent)]
    Ignore(#[from] filters::IgnoreError),

    /// A backend could not be constructed or committed.
    #[error(transparent)]
    Fs(#[from] fsys::FsError),

    /// The transfer failed.
    #[error(transparent)]
    Transfer(#[from] engine::EngineError),

    /// Reading a local file (such as an ignore file) failed.
    #[error("{path}: {source}")]
    Io {
        /// The offending path.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },
}
