//! Fault-injecting file-system wrappers for engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use fsys::{
    FileReader, FileWriter, FsError, FsInfo, Path, ReadableFileSystem, WriteableFileSystem,
};

/// Wraps a destination so that `create` fails with a transient transport
/// error a fixed number of times per path.
pub struct FlakyFs {
    inner: Arc<dyn WriteableFileSystem>,
    create_failures: Mutex<HashMap<String, usize>>,
}

impl FlakyFs {
    pub fn new(inner: Arc<dyn WriteableFileSystem>, failures: &[(&str, usize)]) -> Self {
        Self {
            inner,
            create_failures: Mutex::new(
                failures
                    .iter()
                    .map(|(p, n)| (p.to_string(), *n))
                    .collect(),
            ),
        }
    }
}

impl ReadableFileSystem for FlakyFs {
    fn open(&self, path: &Path) -> fsys::Result<Box<dyn FileReader>> {
        self.inner.open(path)
    }

    fn readlink(&self, path: &Path) -> fsys::Result<Path> {
        self.inner.readlink(path)
    }

    fn stat(&self) -> fsys::Result<FsInfo> {
        self.inner.stat()
    }
}

impl WriteableFileSystem for FlakyFs {
    fn create(&self, path: &Path) -> fsys::Result<Box<dyn FileWriter>> {
        let mut failures = self.create_failures.lock().expect("lock");
        if let Some(remaining) = failures.get_mut(path.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FsError::ConnectionLost);
            }
        }
        drop(failures);
        self.inner.create(path)
    }

    fn keep(&self, path: &Path) -> fsys::Result<()> {
        self.inner.keep(path)
    }

    fn mkdir(&self, path: &Path, mode: u32, uid: i64, gid: i64) -> fsys::Result<()> {
        self.inner.mkdir(path, mode, uid, gid)
    }

    fn link(&self, oldpath: &Path, newpath: &Path) -> fsys::Result<()> {
        self.inner.link(oldpath, newpath)
    }

    fn symlink(&self, oldpath: &Path, newpath: &Path) -> fsys::Result<()> {
        self.inner.symlink(oldpath, newpath)
    }

    fn rename(&self, oldpath: &Path, newpath: &Path) -> fsys::Result<()> {
        self.inner.rename(oldpath, newpath)
    }

    fn remove(&self, path: &Path) -> fsys::Result<()> {
        self.inner.remove(path)
    }

    fn remove_all(&self, path: &Path) -> fsys::Result<()> {
        self.inner.remove_all(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> fsys::Result<()> {
        self.inner.chmod(path, mode)
    }

    fn lchown(&self, path: &Path, uid: i64, gid: i64) -> fsys::Result<()> {
        self.inner.lchown(path, uid, gid)
    }

    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> fsys::Result<()> {
        self.inner.chtimes(path, atime, mtime)
    }
}

/// Wraps a source so that opening or readlinking the victim paths fails
/// with not-found, as if the entry vanished between listing and
/// transfer.
pub struct VanishingFs {
    inner: Arc<dyn ReadableFileSystem>,
    victims: Vec<String>,
}

impl VanishingFs {
    pub fn new(inner: Arc<dyn ReadableFileSystem>, victims: &[&str]) -> Self {
        Self {
            inner,
            victims: victims.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn vanished(&self, path: &Path) -> bool {
        self.victims.iter().any(|v| v == path.as_str())
    }
}

impl ReadableFileSystem for VanishingFs {
    fn open(&self, path: &Path) -> fsys::Result<Box<dyn FileReader>> {
        if self.vanished(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        self.inner.open(path)
    }

    fn readlink(&self, path: &Path) -> fsys::Result<Path> {
        if self.vanished(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        self.inner.readlink(path)
    }

    fn stat(&self) -> fsys::Result<FsInfo> {
        self.inner.stat()
    }
}
