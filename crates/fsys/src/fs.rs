//! Backend capability traits consumed by the transfer engine.

use std::io::{Read, Write};
use std::time::SystemTime;

use crate::error::Result;
use crate::info::FileInfo;
use crate::path::Path;

/// Statistics about a file system.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FsInfo {
    /// How many bytes are available for use.
    pub free_space: u64,
}

/// A file system that can only be read from.
pub trait ReadableFileSystem: Send + Sync {
    /// Opens a file or directory for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn FileReader>>;

    /// Returns the contents of the given symlink.
    fn readlink(&self, path: &Path) -> Result<Path>;

    /// Returns information about this file system.
    fn stat(&self) -> Result<FsInfo>;
}

/// A file system that can be both read from and written to.
pub trait WriteableFileSystem: ReadableFileSystem {
    /// Creates (or overwrites) a file and opens it for writing.
    fn create(&self, path: &Path) -> Result<Box<dyn FileWriter>>;

    /// Informs the file system that the file at `path` should be kept
    /// as-is. Most backends have nothing to do; the copy-on-write backend
    /// materializes the previous snapshot's entry.
    fn keep(&self, path: &Path) -> Result<()>;

    /// Creates a new directory with the given permission mode. A `uid` or
    /// `gid` of -1 is left as-is.
    fn mkdir(&self, path: &Path, mode: u32, uid: i64, gid: i64) -> Result<()>;

    /// Creates a hardlink at `newpath` to the existing file at `oldpath`.
    fn link(&self, oldpath: &Path, newpath: &Path) -> Result<()>;

    /// Creates a symlink at `newpath` whose target is `oldpath`, verbatim.
    fn symlink(&self, oldpath: &Path, newpath: &Path) -> Result<()>;

    /// Moves a file or directory. Must replace `newpath` atomically.
    fn rename(&self, oldpath: &Path, newpath: &Path) -> Result<()>;

    /// Deletes a file or empty directory.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Recursively deletes a directory (or file).
    fn remove_all(&self, path: &Path) -> Result<()>;

    /// Changes file or directory permissions.
    fn chmod(&self, path: &Path, mode: u32) -> Result<()>;

    /// Changes the owner or group. A `uid` or `gid` of -1 is left as-is.
    /// Symlinks are updated, not followed.
    fn lchown(&self, path: &Path, uid: i64, gid: i64) -> Result<()>;

    /// Sets access and modification times.
    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<()>;
}

/// An open file stream or directory that can be read from.
pub trait FileReader: Read + Send {
    /// Returns all directory entries, if the file is a directory. The
    /// caller sorts; no order is guaranteed.
    fn read_dir(&mut self) -> Result<Vec<FileInfo>>;

    /// Returns metadata about the open file.
    fn stat(&self) -> Result<FileInfo>;
}

/// An open file stream that can be written to.
pub trait FileWriter: Write + Send {
    /// Changes the permissions of the open file.
    fn chmod(&mut self, mode: u32) -> Result<()>;

    /// Changes the owner or group of the open file. A `uid` or `gid` of
    /// -1 is left as-is.
    fn chown(&mut self, uid: i64, gid: i64) -> Result<()>;

    /// Closes the stream, surfacing any deferred write error.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Reads the entries of the directory at `path`.
pub fn read_dir_at<F: ReadableFileSystem + ?Sized>(fs: &F, path: &Path) -> Result<Vec<FileInfo>> {
    let mut fr = fs.open(path)?;
    fr.read_dir()
}
