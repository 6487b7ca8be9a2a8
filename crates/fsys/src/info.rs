use std::time::SystemTime;

/// The coarse type of a directory entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    /// A directory.
    Directory,
    /// A regular file.
    Regular,
    /// A symbolic link.
    Symlink,
    /// Anything else: device, socket, FIFO. The engine recognizes and
    /// skips these.
    Special,
}

/// Unix system attributes of a directory entry.
///
/// Not every backend can provide these; [`FileInfo::attrs`] is `None` when
/// they are unavailable. `uid`/`gid` use the `-1` sentinel for "unknown",
/// and an `inode`/`nlinks` of zero means the entry cannot participate in
/// hardlink coordination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileAttrs {
    /// Owning user id, or -1 when unknown.
    pub uid: i64,
    /// Owning group id, or -1 when unknown.
    pub gid: i64,
    /// Last access time.
    pub atime: SystemTime,
    /// Inode number on the source device.
    pub inode: u64,
    /// Number of hardlinks to the inode.
    pub nlinks: u64,
}

/// Metadata describing one directory entry, as produced by a backend
/// listing.
#[derive(Clone, Debug)]
pub struct FileInfo {
    name: String,
    size: u64,
    mode: u32,
    kind: FileKind,
    mtime: SystemTime,
    attrs: Option<FileAttrs>,
}

impl FileInfo {
    /// Creates a descriptor. `mode` carries the permission and special
    /// bits (no type bits; the type lives in `kind`).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        size: u64,
        mode: u32,
        kind: FileKind,
        mtime: SystemTime,
        attrs: Option<FileAttrs>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mode: mode & 0o7777,
            kind,
            mtime,
            attrs,
        }
    }

    /// Builds a descriptor from OS metadata.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Special
        };

        let atime = SystemTime::UNIX_EPOCH
            + std::time::Duration::new(meta.atime().max(0) as u64, meta.atime_nsec().max(0) as u32);
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Self {
            name: name.into(),
            size: meta.len(),
            mode: meta.mode() & 0o7777,
            kind,
            mtime,
            attrs: Some(FileAttrs {
                uid: i64::from(meta.uid()),
                gid: i64::from(meta.gid()),
                atime,
                inode: meta.ino(),
                nlinks: meta.nlink(),
            }),
        }
    }

    /// The entry's name (final path component).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Permission and special bits (`0o7777` mask).
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The entry type.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Returns whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Returns whether the entry is a symbolic link.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Modification time.
    #[must_use]
    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// System attributes, when the backend provides them.
    #[must_use]
    pub fn attrs(&self) -> Option<&FileAttrs> {
        self.attrs.as_ref()
    }

    /// The `{uid, gid, atime}` triple used when materializing the entry,
    /// defaulted to `{-1, -1, mtime}` when the backend has no attributes.
    #[must_use]
    pub fn ownership(&self) -> (i64, i64, SystemTime) {
        match &self.attrs {
            Some(a) => (a.uid, a.gid, a.atime),
            None => (-1, -1, self.mtime),
        }
    }
}
