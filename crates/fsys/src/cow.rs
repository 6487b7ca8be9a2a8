//! Copy-on-write snapshot layer.
//!
//! A [`CowFs`] wraps a writeable backend so that reads come from the most
//! recent completed snapshot of a host while writes land in a fresh
//! timestamped snapshot directory. Unchanged entries are carried over as
//! hardlinks via [`WriteableFileSystem::keep`], so a snapshot costs disk
//! only for what changed. Nothing is ever deleted: absence in the write
//! root means the entry is not part of the new snapshot.
//!
//! On-disk layout under the backend root:
//!
//! ```text
//! .latest -> <host>/<ts>          latest snapshot of any host
//! <host>/
//!   .latest -> <ts>               latest snapshot of this host
//!   <ts>.complete -> <ts>         marker that <ts> finished
//!   <ts>/ ...                     the snapshot tree
//! ```
//!
//! The three symlinks are written by [`CowFs::finish`] via
//! write-to-`.new`-then-rename, because not every backend can overwrite a
//! symlink in place.

use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{FsError, Result};
use crate::fs::{FileReader, FileWriter, FsInfo, ReadableFileSystem, WriteableFileSystem};
use crate::path::Path;

const LATEST: &str = ".latest";
const COMPLETE_SUFFIX: &str = ".complete";

/// Snapshot directory name format. Lexicographic order on the rendered
/// string is chronological order, which the monotonicity check relies on.
const TS_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:6]");

/// A copy-on-write file system.
pub struct CowFs {
    inner: Arc<dyn WriteableFileSystem>,
    rroot: Path,
    wroot: Path,
    init: OnceLock<Result<()>>,
}

impl CowFs {
    /// Creates a copy-on-write view over `inner` for `host` at time `t`.
    ///
    /// The read root is resolved from `<host>/.latest`, falling back to
    /// the global `.latest`, falling back to the new snapshot directory
    /// itself on a first run. When a previous snapshot exists, the new
    /// timestamp must sort strictly after it.
    pub fn new(inner: Arc<dyn WriteableFileSystem>, host: &str, t: OffsetDateTime) -> Result<Self> {
        if host.is_empty() {
            return Err(FsError::Invalid("host must be non-empty".to_string()));
        }

        let ts = t
            .format(TS_FORMAT)
            .map_err(|e| FsError::Invalid(format!("unformattable timestamp: {e}")))?;
        let host_path = Path::new(host);

        let (rroot, prev) = match inner.readlink(&host_path.resolve(LATEST)) {
            Ok(prev) => {
                let base = prev.base();
                (host_path.resolve(&prev), Some(base))
            }
            Err(e) if e.is_not_found() => match inner.readlink(&Path::from(LATEST)) {
                Ok(global) => {
                    let base = global.base();
                    (Path::from(".").resolve(&global), Some(base))
                }
                Err(e) if e.is_not_found() => (host_path.resolve(&ts), None),
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };

        if let Some(prev) = prev {
            if ts.as_str() <= prev.as_str() {
                return Err(FsError::Invalid(format!(
                    "there is a newer timestamp already: new {ts}, existing {prev}"
                )));
            }
        }

        Ok(Self {
            inner,
            rroot,
            wroot: host_path.resolve(&ts),
            init: OnceLock::new(),
        })
    }

    /// The snapshot root reads are served from.
    #[must_use]
    pub fn read_root(&self) -> &Path {
        &self.rroot
    }

    /// The snapshot root writes land in.
    #[must_use]
    pub fn write_root(&self) -> &Path {
        &self.wroot
    }

    /// Creates the write root on first use. The snapshot directory must
    /// not pre-exist; a failure here is cached and returned to every
    /// caller.
    fn init(&self) -> Result<()> {
        self.init
            .get_or_init(|| {
                match self.inner.mkdir(&self.wroot.dir(), 0o750, -1, -1) {
                    Ok(()) => {}
                    Err(e) if e.is_already_exists() => {}
                    Err(e) => return Err(e),
                }
                self.inner.mkdir(&self.wroot, 0o750, -1, -1)
            })
            .clone()
    }

    fn atomic_symlink(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        let tmp = newpath.dir().resolve(".new");
        self.inner.symlink(oldpath, &tmp)?;
        self.inner.rename(&tmp, newpath)
    }

    /// Commits the snapshot: marks it complete, then repoints the
    /// per-host and global `.latest` symlinks, each atomically.
    pub fn finish(&self) -> Result<()> {
        let base = self.wroot.base();
        self.atomic_symlink(&base, &self.wroot.with_suffix(COMPLETE_SUFFIX))?;
        self.atomic_symlink(&base, &self.wroot.dir().resolve(LATEST))?;
        self.atomic_symlink(&self.wroot, &Path::from(LATEST))
    }
}

impl ReadableFileSystem for CowFs {
    fn open(&self, path: &Path) -> Result<Box<dyn FileReader>> {
        self.inner.open(&self.rroot.resolve(path))
    }

    fn readlink(&self, path: &Path) -> Result<Path> {
        self.inner.readlink(&self.rroot.resolve(path))
    }

    fn stat(&self) -> Result<FsInfo> {
        self.inner.stat()
    }
}

impl WriteableFileSystem for CowFs {
    fn create(&self, path: &Path) -> Result<Box<dyn FileWriter>> {
        self.init()?;
        self.inner.create(&self.wroot.resolve(path))
    }

    fn keep(&self, path: &Path) -> Result<()> {
        self.init()?;

        match self
            .inner
            .link(&self.rroot.resolve(path), &self.wroot.resolve(path))
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_permission() => {}
            Err(e) => return Err(e),
        }

        // Hardlinking failed with a permission error, so this is most
        // likely a directory. Recreate it in the write root with the
        // read side's mode and ownership.
        let fr = self.inner.open(&self.rroot.resolve(path))?;
        let fi = fr.stat()?;
        let (uid, gid, _) = fi.ownership();
        self.inner
            .mkdir(&self.wroot.resolve(path), fi.mode() | 0o200, uid, gid)
    }

    fn mkdir(&self, path: &Path, mode: u32, uid: i64, gid: i64) -> Result<()> {
        self.init()?;
        self.inner.mkdir(&self.wroot.resolve(path), mode, uid, gid)
    }

    fn link(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        self.init()?;
        self.inner
            .link(&self.wroot.resolve(oldpath), &self.wroot.resolve(newpath))
    }

    fn symlink(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        self.init()?;
        self.inner.symlink(oldpath, &self.wroot.resolve(newpath))
    }

    fn rename(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        self.init()?;
        // The old path may exist only in the previous snapshot so far;
        // materialize it in the write root before moving it. It may also
        // already be present (freshly written, or carried over earlier),
        // or be new in this snapshot with no read-side counterpart.
        match self.keep(oldpath) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() || e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.inner
            .rename(&self.wroot.resolve(oldpath), &self.wroot.resolve(newpath))
    }

    fn remove(&self, _path: &Path) -> Result<()> {
        // Removal is implicit: the entry is simply absent from the new
        // snapshot.
        Ok(())
    }

    fn remove_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.inner.chmod(&self.wroot.resolve(path), mode)
    }

    fn lchown(&self, path: &Path, uid: i64, gid: i64) -> Result<()> {
        self.inner.lchown(&self.wroot.resolve(path), uid, gid)
    }

    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<()> {
        self.inner.chtimes(&self.wroot.resolve(path), atime, mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamp_format_is_sortable() {
        let a = datetime!(2023-04-05 06:07:08.000001 UTC)
            .format(TS_FORMAT)
            .expect("format");
        let b = datetime!(2023-04-05 06:07:09 UTC)
            .format(TS_FORMAT)
            .expect("format");
        assert_eq!(a, "2023-04-05T06-07-08.000001");
        assert!(a < b);
    }
}
