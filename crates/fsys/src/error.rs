//! Error taxonomy shared by every file-system backend.
//!
//! The transfer engine never inspects error strings; it calls the
//! predicates on [`FsError`] to decide between retry, fallback, and
//! failure. Backends classify their native errors into these variants at
//! construction time. Local I/O errors are never retriable; only the
//! transient transport variants are.

use std::io;

use thiserror::Error;

/// Result type for file-system operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors produced by file-system backends.
///
/// The variants carry the file-system-relative path they occurred on where
/// one exists. The type is `Clone` so one-shot initializers can cache a
/// failure.
#[derive(Clone, Debug, Error)]
pub enum FsError {
    /// The file or directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The file or directory already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation was denied by permissions.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The transport to a remote backend was lost mid-operation.
    #[error("connection lost")]
    ConnectionLost,

    /// There is currently no transport to a remote backend.
    #[error("no connection")]
    NoConnection,

    /// Any other I/O error, with its original kind and message.
    #[error("{path}: {message}")]
    Io {
        /// Path the operation was invoked on.
        path: String,
        /// The original [`io::ErrorKind`].
        kind: io::ErrorKind,
        /// Rendered message of the underlying error.
        message: String,
    },

    /// The backend cannot perform the requested operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The caller supplied an invalid argument.
    #[error("{0}")]
    Invalid(String),
}

impl FsError {
    /// Classifies an [`io::Error`] raised while operating on `path`.
    #[must_use]
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            kind => Self::Io {
                path,
                kind,
                message: err.to_string(),
            },
        }
    }

    /// Returns whether the error means the target does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns whether the error means the target already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns whether the error is a permission failure.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns whether retrying the operation may succeed.
    ///
    /// Only transient transport errors qualify. `NotFound`,
    /// `AlreadyExists`, and `PermissionDenied` describe durable state and
    /// are never retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::NoConnection)
    }
}
