use std::fmt;
use std::time::Duration;

use fsys::{FileInfo, Path};

/// The non-type mode bits the engine compares and transfers: the
/// user/group/other permission triplets.
pub(crate) const COMMON_MODE_MASK: u32 = 0o777;

/// Owner-write, forced on every directory the engine writes so it can
/// keep creating entries inside.
pub(crate) const OWNER_WRITE: u32 = 0o200;

/// The mtime tolerance of the freshness predicate. Some backends round
/// timestamps to whole seconds.
const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// One of the transfer file operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileOperation {
    /// The entry exists only at the source.
    Create,
    /// The entry exists only at the destination.
    Remove,
    /// Both sides are present and equivalent.
    Keep,
    /// Both sides are present and differ.
    Update,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::Create => 'C',
            Self::Remove => 'R',
            Self::Keep => 'K',
            Self::Update => 'U',
        };
        write!(f, "{c}")
    }
}

/// A file in a transfer operation. The path identifies the entry on both
/// sides; `src` is absent for a removed entry and `dest` is absent for a
/// new one. At least one side is always present.
#[derive(Clone, Debug)]
pub struct FilePair {
    pub(crate) path: Path,
    pub(crate) src: Option<FileInfo>,
    pub(crate) dest: Option<FileInfo>,
}

impl FilePair {
    pub(crate) fn new(path: Path, src: Option<FileInfo>, dest: Option<FileInfo>) -> Self {
        debug_assert!(src.is_some() || dest.is_some());
        Self { path, src, dest }
    }

    /// The path identifying the pair on both sides.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overall file information about the pair: the source side when
    /// present, the destination otherwise.
    #[must_use]
    pub fn file_info(&self) -> &FileInfo {
        self.src
            .as_ref()
            .or(self.dest.as_ref())
            .expect("a file pair has at least one side")
    }

    /// The operation this pair needs to synchronize.
    #[must_use]
    pub fn operation(&self) -> FileOperation {
        match (&self.src, &self.dest) {
            (Some(src), Some(_)) => {
                let needs = if src.is_dir() {
                    directory_needs_transfer(self.dest.as_ref(), src)
                } else {
                    file_needs_transfer(self.dest.as_ref(), src)
                };
                if needs {
                    FileOperation::Update
                } else {
                    FileOperation::Keep
                }
            }
            (Some(_), None) => FileOperation::Create,
            (None, Some(_)) => FileOperation::Remove,
            (None, None) => unreachable!("a file pair has at least one side"),
        }
    }
}

/// Returns whether the source file needs to be transferred to the
/// destination. Regular files and symlinks are fresh when size and
/// permission bits match and the mtimes are within one second of each
/// other.
pub(crate) fn file_needs_transfer(dest: Option<&FileInfo>, src: &FileInfo) -> bool {
    let Some(dest) = dest else {
        return true;
    };
    let drift = match dest.mtime().duration_since(src.mtime()) {
        Ok(d) => d,
        Err(e) => e.duration(),
    };
    dest.size() != src.size()
        || dest.mode() & COMMON_MODE_MASK != src.mode() & COMMON_MODE_MASK
        || drift > MTIME_TOLERANCE
}

/// Returns whether the source directory needs to be transferred. The
/// owner-write bit is ignored because the engine forces it on every
/// directory it writes.
pub(crate) fn directory_needs_transfer(dest: Option<&FileInfo>, src: &FileInfo) -> bool {
    let Some(dest) = dest else {
        return true;
    };
    dest.mode() & COMMON_MODE_MASK & !OWNER_WRITE != src.mode() & COMMON_MODE_MASK & !OWNER_WRITE
}
