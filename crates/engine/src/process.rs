//! The tree walk driving per-pair transfers.
//!
//! For every directory the walk lists source and destination
//! concurrently, merge-joins the two sorted listings into file pairs,
//! and hands the pairs to the traversal. Directories are placed first in
//! stack order so that, with the LIFO stack popping the tail, regular
//! files are processed before their sibling directories; that bounds the
//! in-memory working set, since directories keep their descendants alive
//! until they drain.
//!
//! The transfer of a directory pair runs concurrently with the listing
//! of its children. A directory's transfer may therefore finish before,
//! after, or alongside its children's listings; the only pre-order
//! requirement is that a directory exists and is writable before a child
//! is created in it, which forcing owner-write on written directories
//! guarantees.

use std::sync::atomic::Ordering;
use std::thread;

use tracing::{error, trace};

use fsys::{read_dir_at, FileInfo, Path, ReadableFileSystem, WriteableFileSystem};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::pair::FilePair;
use crate::pdfs;
use crate::stats::ProcessCounters;

pub(crate) struct Process<'a, F> {
    pub src: &'a dyn ReadableFileSystem,
    pub dest: &'a dyn WriteableFileSystem,
    pub ignore: &'a (dyn Fn(&str) -> bool + Sync),
    pub nconc: usize,
    pub stats: &'a ProcessCounters,
    pub transfer: F,
}

impl<F> Process<'_, F>
where
    F: Fn(&CancelToken, &FilePair) -> Result<()> + Sync,
{
    /// Performs the parallel transfer of the whole tree.
    pub fn run(&self, token: &CancelToken) -> Result<()> {
        let roots = self.list_dir(&Path::from("."))?;
        pdfs::run(token, roots, self.nconc, |t, fp| self.process_pair(t, fp))
    }

    /// Invoked once per pair. For source directories it returns the
    /// children to traverse next; when this returns, the entry itself has
    /// been fully created.
    fn process_pair(&self, token: &CancelToken, fp: FilePair) -> Result<Vec<FilePair>> {
        self.stats.in_progress.fetch_add(1, Ordering::Relaxed);
        let result = self.process_pair_inner(token, &fp);
        self.stats.in_progress.fetch_sub(1, Ordering::Relaxed);
        result
    }

    fn process_pair_inner(&self, token: &CancelToken, fp: &FilePair) -> Result<Vec<FilePair>> {
        if let Some(src) = &fp.src {
            if src.is_dir() {
                self.stats.source_directories.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.source_bytes.fetch_add(src.size(), Ordering::Relaxed);
                self.stats.source_files.fetch_add(1, Ordering::Relaxed);
            }
        }

        let is_dir = fp.file_info().is_dir();
        let mut filter_path = format!("/{}", fp.path);
        if is_dir {
            filter_path.push('/');
        }
        if (self.ignore)(&filter_path) {
            if is_dir {
                self.stats.ignored_directories.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.ignored_files.fetch_add(1, Ordering::Relaxed);
            }
            trace!(path = %fp.path, "ignored");
            return Ok(Vec::new());
        }

        let list_children = fp.src.as_ref().is_some_and(FileInfo::is_dir);
        let (transfer_res, children_res) = thread::scope(|scope| {
            let lister = list_children.then(|| scope.spawn(|| self.list_dir(&fp.path)));
            let transfer_res = (self.transfer)(token, fp);
            let children_res = lister.map(|h| h.join().expect("directory lister panicked"));
            (transfer_res, children_res)
        });

        if let Err(err) = transfer_res {
            error!(path = %fp.path, error = %err, "failed to transfer");
            trace!(src = ?fp.src, dest = ?fp.dest, "failed pair");
            return Err(err);
        }
        match children_res {
            Some(res) => res,
            None => Ok(Vec::new()),
        }
    }

    /// Creates file pairs for the children of the given directory.
    fn list_dir(&self, path: &Path) -> Result<Vec<FilePair>> {
        let (src_res, dest_res) = thread::scope(|scope| {
            let dest_handle = scope.spawn(|| read_dir_at(self.dest, path));
            let src_res = read_dir_at(self.src, path);
            (src_res, dest_handle.join().expect("destination lister panicked"))
        });

        let mut srcfiles = src_res?;
        // A destination that does not exist yet lists as empty.
        let mut destfiles = match dest_res {
            Ok(files) => files,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        srcfiles.sort_by(|a, b| a.name().cmp(b.name()));
        destfiles.sort_by(|a, b| a.name().cmp(b.name()));

        // Join the two sorted listings.
        let mut fps = Vec::with_capacity(srcfiles.len().max(destfiles.len()));
        let mut si = srcfiles.into_iter().peekable();
        let mut di = destfiles.into_iter().peekable();
        while let (Some(sf), Some(df)) = (si.peek(), di.peek()) {
            match sf.name().cmp(df.name()) {
                std::cmp::Ordering::Less => {
                    // New file.
                    let sf = si.next().expect("peeked");
                    fps.push(FilePair::new(path.resolve(sf.name()), Some(sf), None));
                }
                std::cmp::Ordering::Greater => {
                    // Removed file.
                    let df = di.next().expect("peeked");
                    fps.push(FilePair::new(path.resolve(df.name()), None, Some(df)));
                }
                std::cmp::Ordering::Equal => {
                    let sf = si.next().expect("peeked");
                    let df = di.next().expect("peeked");
                    fps.push(FilePair::new(path.resolve(sf.name()), Some(sf), Some(df)));
                }
            }
        }
        for sf in si {
            fps.push(FilePair::new(path.resolve(sf.name()), Some(sf), None));
        }
        for df in di {
            fps.push(FilePair::new(path.resolve(df.name()), None, Some(df)));
        }

        // Directories sort first so that the LIFO stack works on files
        // before sibling directories.
        fps.sort_by(|a, b| {
            let adir = a.file_info().is_dir();
            let bdir = b.file_info().is_dir();
            bdir.cmp(&adir).then_with(|| a.path.cmp(&b.path))
        });

        Ok(fps)
    }
}
