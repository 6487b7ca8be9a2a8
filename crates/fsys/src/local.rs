//! Backend for the OS native file system, rooted at a directory.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::SystemTime;

use filetime::FileTime;
use rustix::fs::{AtFlags, CWD};

use crate::error::{FsError, Result};
use crate::fs::{FileReader, FileWriter, FsInfo, ReadableFileSystem, WriteableFileSystem};
use crate::info::FileInfo;
use crate::ownership::{gid_from_raw, uid_from_raw};
use crate::path::Path;

/// A file system working on the OS native file system.
///
/// All operations resolve their path argument against the root given at
/// construction. Errors are classified into [`FsError`]; local errors are
/// never retriable.
#[derive(Debug)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Creates a backend rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, path: &Path) -> PathBuf {
        self.root.join(path.as_str())
    }
}

impl ReadableFileSystem for LocalFs {
    fn open(&self, path: &Path) -> Result<Box<dyn FileReader>> {
        let full = self.full(path);
        let file = fs::File::open(&full).map_err(|e| FsError::from_io(path.as_str(), e))?;
        Ok(Box::new(LocalFileReader {
            file,
            full,
            path: path.clone(),
        }))
    }

    fn readlink(&self, path: &Path) -> Result<Path> {
        let target = fs::read_link(self.full(path))
            .map_err(|e| FsError::from_io(path.as_str(), e))?;
        Ok(Path::new(target.to_string_lossy().into_owned()))
    }

    fn stat(&self) -> Result<FsInfo> {
        let vfs = rustix::fs::statvfs(&self.root)
            .map_err(|e| FsError::from_io(self.root.to_string_lossy(), e.into()))?;
        Ok(FsInfo {
            free_space: vfs.f_frsize * vfs.f_bavail,
        })
    }
}

impl WriteableFileSystem for LocalFs {
    fn create(&self, path: &Path) -> Result<Box<dyn FileWriter>> {
        let full = self.full(path);
        let file = fs::File::create(&full).map_err(|e| FsError::from_io(path.as_str(), e))?;
        Ok(Box::new(LocalFileWriter {
            file,
            path: path.clone(),
        }))
    }

    fn keep(&self, _path: &Path) -> Result<()> {
        // The destination entry is already in place.
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32, uid: i64, gid: i64) -> Result<()> {
        let full = self.full(path);
        fs::create_dir(&full).map_err(|e| FsError::from_io(path.as_str(), e))?;
        // create_dir is subject to the umask; stamp the exact mode.
        fs::set_permissions(&full, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| FsError::from_io(path.as_str(), e))?;
        if uid >= 0 || gid >= 0 {
            if let Err(err) = self.lchown(path, uid, gid) {
                let _ = fs::remove_dir(&full);
                return Err(err);
            }
        }
        Ok(())
    }

    fn link(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        fs::hard_link(self.full(oldpath), self.full(newpath))
            .map_err(|e| FsError::from_io(newpath.as_str(), e))
    }

    fn symlink(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        std::os::unix::fs::symlink(oldpath.as_str(), self.full(newpath))
            .map_err(|e| FsError::from_io(newpath.as_str(), e))
    }

    fn rename(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        fs::rename(self.full(oldpath), self.full(newpath))
            .map_err(|e| FsError::from_io(newpath.as_str(), e))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let full = self.full(path);
        let meta =
            fs::symlink_metadata(&full).map_err(|e| FsError::from_io(path.as_str(), e))?;
        let res = if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        res.map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let full = self.full(path);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::from_io(path.as_str(), e)),
        };
        let res = if meta.is_dir() {
            fs::remove_dir_all(&full)
        } else {
            fs::remove_file(&full)
        };
        res.map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(self.full(path), fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn lchown(&self, path: &Path, uid: i64, gid: i64) -> Result<()> {
        let owner = (uid >= 0).then(|| uid_from_raw(uid as u32));
        let group = (gid >= 0).then(|| gid_from_raw(gid as u32));
        rustix::fs::chownat(
            CWD,
            &self.full(path),
            owner,
            group,
            AtFlags::SYMLINK_NOFOLLOW,
        )
        .map_err(|e| FsError::from_io(path.as_str(), e.into()))
    }

    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<()> {
        filetime::set_file_times(
            self.full(path),
            FileTime::from_system_time(atime),
            FileTime::from_system_time(mtime),
        )
        .map_err(|e| FsError::from_io(path.as_str(), e))
    }
}

struct LocalFileReader {
    file: fs::File,
    full: PathBuf,
    path: Path,
}

impl Read for LocalFileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl FileReader for LocalFileReader {
    fn read_dir(&mut self) -> Result<Vec<FileInfo>> {
        let entries =
            fs::read_dir(&self.full).map_err(|e| FsError::from_io(self.path.as_str(), e))?;
        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(self.path.as_str(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = fs::symlink_metadata(entry.path())
                .map_err(|e| FsError::from_io(self.path.as_str(), e))?;
            infos.push(FileInfo::from_metadata(name, &meta));
        }
        Ok(infos)
    }

    fn stat(&self) -> Result<FileInfo> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| FsError::from_io(self.path.as_str(), e))?;
        Ok(FileInfo::from_metadata(self.path.base().as_str(), &meta))
    }
}

struct LocalFileWriter {
    file: fs::File,
    path: Path,
}

impl Write for LocalFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl FileWriter for LocalFileWriter {
    fn chmod(&mut self, mode: u32) -> Result<()> {
        self.file
            .set_permissions(fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| FsError::from_io(self.path.as_str(), e))
    }

    fn chown(&mut self, uid: i64, gid: i64) -> Result<()> {
        let owner = (uid >= 0).then(|| uid_from_raw(uid as u32));
        let group = (gid >= 0).then(|| gid_from_raw(gid as u32));
        rustix::fs::fchown(&self.file, owner, group)
            .map_err(|e| FsError::from_io(self.path.as_str(), e.into()))
    }

    fn close(self: Box<Self>) -> Result<()> {
        // Dropping the handle closes it; local closes do not fail in ways
        // we can usefully report.
        Ok(())
    }
}
