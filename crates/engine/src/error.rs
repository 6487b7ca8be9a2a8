use fsys::FsError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the transfer engine.
#[derive(Clone, Debug, Error)]
pub enum EngineError {
    /// A backend operation failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,

    /// The source entry vanished between listing and transfer. Handled
    /// inside the per-file path and never escapes a successful run.
    #[error("file discarded")]
    Discarded,
}

impl EngineError {
    /// Returns whether retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Fs(e) => e.is_retriable(),
            Self::Cancelled | Self::Discarded => false,
        }
    }
}
