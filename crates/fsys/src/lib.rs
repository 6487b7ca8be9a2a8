#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fsys` is the file-system layer of the treesync workspace. It defines the
//! relative [`Path`] value type, the [`ReadableFileSystem`] and
//! [`WriteableFileSystem`] capability traits consumed by the transfer engine,
//! the [`FsError`] taxonomy with backend-portable predicates, and two
//! backends:
//!
//! - [`LocalFs`], rooted at a directory on the OS file system, and
//! - [`CowFs`], a copy-on-write layer that reads from the previous snapshot
//!   of a host and writes into a new timestamped snapshot, committing it
//!   atomically with [`CowFs::finish`].
//!
//! # Design
//!
//! Paths handed to a file system are always relative to the root the backend
//! was constructed with; [`Path::resolve`] normalizes `.` and `..` textually
//! and strips leading separators so a caller-supplied path can never escape
//! that root. Errors are classified at construction time into [`FsError`]
//! variants rather than by string matching, so the engine's retry and
//! fallback decisions work identically across backends.

mod cow;
mod error;
mod fs;
mod info;
mod local;
mod ownership;
mod path;

pub use cow::CowFs;
pub use error::{FsError, Result};
pub use fs::{read_dir_at, FileReader, FileWriter, FsInfo, ReadableFileSystem, WriteableFileSystem};
pub use info::{FileAttrs, FileInfo, FileKind};
pub use local::LocalFs;
pub use path::Path;
