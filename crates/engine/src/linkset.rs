//! Coordination of multi-linked source inodes.
//!
//! When the source tree has several hardlinks to one inode, exactly one
//! transfer must materialize the content on the destination; every other
//! holder hardlinks to it. The first caller to offer an inode becomes the
//! materializer; later callers block until the materializer either
//! fulfills (they then link to its path) or discards (the next waiter
//! takes over as materializer).
//!
//! `remaining` is conserved: it starts at the source link count and
//! decreases by one per fulfill, discard, or link-path handout; the
//! record is removed exactly when it reaches zero. `uploaded` is monotone
//! once set.

use std::sync::{Condvar, Mutex};

use rustc_hash::FxHashMap;

use fsys::{FileInfo, Path};

/// What the link set decided for an offered file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum LinkOffer {
    /// The file does not share its inode; transfer it normally.
    NotShared,
    /// The caller is the materializer for `inode` and must transfer the
    /// content, then call [`LinkSet::fulfill`] or [`LinkSet::discard`].
    Materialize(u64),
    /// The content is already at `first_path`; hardlink to it.
    LinkTo(u64, Path),
}

struct InodeInfo {
    first_path: Option<Path>,
    uploaded: bool,
    remaining: u64,
}

/// A map of source inode records guarded by one lock and condition
/// variable. Waiters unblock on either "uploaded became true" or "the
/// materializer gave up and the slot is open again".
pub(crate) struct LinkSet {
    inodes: Mutex<FxHashMap<u64, InodeInfo>>,
    cond: Condvar,
}

impl LinkSet {
    pub(crate) fn new() -> Self {
        Self {
            inodes: Mutex::new(FxHashMap::default()),
            cond: Condvar::new(),
        }
    }

    /// Offers a source file and blocks until its role is decided.
    ///
    /// Directories and files without inode information or with fewer
    /// than two links are not interesting and return
    /// [`LinkOffer::NotShared`] immediately.
    pub(crate) fn finished_file(&self, path: &Path, src: &FileInfo) -> LinkOffer {
        if src.is_dir() {
            return LinkOffer::NotShared;
        }
        let Some(attrs) = src.attrs() else {
            return LinkOffer::NotShared;
        };
        if attrs.inode == 0 || attrs.nlinks < 2 {
            return LinkOffer::NotShared;
        }
        let inode = attrs.inode;

        let mut inodes = self.inodes.lock().unwrap_or_else(|e| e.into_inner());
        inodes.entry(inode).or_insert_with(|| InodeInfo {
            first_path: None,
            uploaded: false,
            remaining: attrs.nlinks,
        });

        loop {
            let Some(info) = inodes.get_mut(&inode) else {
                // The record drained while we were waiting; fall back to
                // a full transfer.
                return LinkOffer::NotShared;
            };

            if info.uploaded {
                let first = info
                    .first_path
                    .clone()
                    .expect("an uploaded inode has a first path");
                info.remaining -= 1;
                if info.remaining == 0 {
                    inodes.remove(&inode);
                }
                return LinkOffer::LinkTo(inode, first);
            }

            if info.first_path.is_none() {
                // We are the first one here, or the previous materializer
                // discarded.
                info.first_path = Some(path.clone());
                return LinkOffer::Materialize(inode);
            }

            inodes = self.cond.wait(inodes).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Informs the set that the destination file for `inode` is ready.
    pub(crate) fn fulfill(&self, inode: u64) {
        let mut inodes = self.inodes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = inodes.get_mut(&inode) {
            info.uploaded = true;
            info.remaining -= 1;
            if info.remaining == 0 {
                inodes.remove(&inode);
            }
        }
        self.cond.notify_all();
    }

    /// Releases the materializer slot for `inode` after a failed
    /// transfer, letting the next waiter take over.
    pub(crate) fn discard(&self, inode: u64, path: &Path) {
        let mut inodes = self.inodes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = inodes.get_mut(&inode) {
            if info.first_path.as_ref() == Some(path) {
                info.first_path = None;
            }
            info.remaining -= 1;
            if info.remaining == 0 {
                inodes.remove(&inode);
            }
        }
        self.cond.notify_all();
    }

    /// The number of outstanding inode records.
    pub(crate) fn len(&self) -> usize {
        self.inodes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsys::{FileAttrs, FileKind};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, SystemTime};

    fn shared(name: &str, inode: u64, nlinks: u64) -> FileInfo {
        FileInfo::new(
            name,
            6,
            0o644,
            FileKind::Regular,
            SystemTime::UNIX_EPOCH,
            Some(FileAttrs {
                uid: -1,
                gid: -1,
                atime: SystemTime::UNIX_EPOCH,
                inode,
                nlinks,
            }),
        )
    }

    #[test]
    fn unshared_files_are_not_interesting() {
        let set = LinkSet::new();
        let one_link = shared("a", 7, 1);
        assert_eq!(set.finished_file(&Path::from("a"), &one_link), LinkOffer::NotShared);

        let no_attrs =
            FileInfo::new("a", 0, 0o644, FileKind::Regular, SystemTime::UNIX_EPOCH, None);
        assert_eq!(set.finished_file(&Path::from("a"), &no_attrs), LinkOffer::NotShared);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn directories_are_not_interesting() {
        let set = LinkSet::new();
        let dir = FileInfo::new(
            "d",
            0,
            0o755,
            FileKind::Directory,
            SystemTime::UNIX_EPOCH,
            Some(FileAttrs {
                uid: -1,
                gid: -1,
                atime: SystemTime::UNIX_EPOCH,
                inode: 9,
                nlinks: 3,
            }),
        );
        assert_eq!(set.finished_file(&Path::from("d"), &dir), LinkOffer::NotShared);
    }

    #[test]
    fn first_holder_materializes() {
        let set = LinkSet::new();
        let fi = shared("a", 42, 2);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(42)
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn fulfill_hands_out_link_path_and_drains() {
        let set = LinkSet::new();
        let fi = shared("a", 42, 2);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(42)
        );
        set.fulfill(42);
        assert_eq!(set.len(), 1);

        let fi_b = shared("b", 42, 2);
        assert_eq!(
            set.finished_file(&Path::from("b"), &fi_b),
            LinkOffer::LinkTo(42, Path::from("a"))
        );
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn waiter_blocks_until_fulfilled() {
        let set = Arc::new(LinkSet::new());
        let fi = shared("a", 1, 2);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(1)
        );

        let waiter_set = Arc::clone(&set);
        let waiter = thread::spawn(move || {
            let fi = shared("b", 1, 2);
            waiter_set.finished_file(&Path::from("b"), &fi)
        });

        thread::sleep(Duration::from_millis(20));
        set.fulfill(1);
        assert_eq!(waiter.join().expect("join"), LinkOffer::LinkTo(1, Path::from("a")));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn discard_promotes_the_next_waiter() {
        let set = Arc::new(LinkSet::new());
        let fi = shared("a", 1, 3);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(1)
        );

        let waiter_set = Arc::clone(&set);
        let waiter = thread::spawn(move || {
            let fi = shared("b", 1, 3);
            waiter_set.finished_file(&Path::from("b"), &fi)
        });

        thread::sleep(Duration::from_millis(20));
        set.discard(1, &Path::from("a"));
        assert_eq!(waiter.join().expect("join"), LinkOffer::Materialize(1));
        // One slot was drained by the discard.
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn discard_by_last_holder_removes_the_record() {
        let set = LinkSet::new();
        let fi = shared("a", 1, 2);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(1)
        );
        set.discard(1, &Path::from("a"));
        assert_eq!(set.len(), 1);
        set.discard(1, &Path::from("b"));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn discard_ignores_foreign_first_path() {
        let set = LinkSet::new();
        let fi = shared("a", 1, 3);
        assert_eq!(
            set.finished_file(&Path::from("a"), &fi),
            LinkOffer::Materialize(1)
        );
        // A non-materializer discard must not clear the slot.
        set.discard(1, &Path::from("z"));
        set.fulfill(1);

        let fi_b = shared("b", 1, 3);
        assert_eq!(
            set.finished_file(&Path::from("b"), &fi_b),
            LinkOffer::LinkTo(1, Path::from("a"))
        );
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn many_concurrent_holders_converge() {
        let set = Arc::new(LinkSet::new());
        let nlinks = 8;
        let mut handles = Vec::new();
        for i in 0..nlinks {
            let set = Arc::clone(&set);
            handles.push(thread::spawn(move || {
                let name = format!("f{i}");
                let fi = shared(&name, 5, nlinks as u64);
                match set.finished_file(&Path::from(name.as_str()), &fi) {
                    LinkOffer::Materialize(inode) => {
                        set.fulfill(inode);
                        true
                    }
                    LinkOffer::LinkTo(_, _) => false,
                    LinkOffer::NotShared => panic!("inode must be shared"),
                }
            }));
        }

        let materializers = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|&m| m)
            .count();
        assert_eq!(materializers, 1);
        assert_eq!(set.len(), 0);
    }
}
