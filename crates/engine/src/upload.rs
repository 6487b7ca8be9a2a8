//! Per-pair transfer execution.
//!
//! [`Upload`] owns the destination and source backends plus the policy
//! knobs (ignore filter, concurrency, id maps, file hook) and drives the
//! tree walk. Each pair is classified from its two sides and executed:
//! removals delete, fresh entries are kept (a hardlink in the snapshot
//! backend), everything else is materialized. Every pair runs inside the
//! idempotent retry wrapper, so a transient transport failure re-runs
//! the classification against the same listing.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, trace};

use fsys::{FileInfo, FileKind, ReadableFileSystem, WriteableFileSystem};

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::linkset::{LinkOffer, LinkSet};
use crate::pair::{
    directory_needs_transfer, file_needs_transfer, FileOperation, FilePair, COMMON_MODE_MASK,
    OWNER_WRITE,
};
use crate::process::Process;
use crate::retry;
use crate::stats::{UploadCounters, UploadStats};

/// Size of the copy buffer for file contents.
const COPY_BUF_SIZE: usize = 128 * 1024;

/// Predicate over filter paths. The engine hands it `/`-prefixed paths
/// with a trailing `/` for directories, so gitignore-style rules anchor
/// correctly. Matching entries are skipped entirely.
pub type IgnoreFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Maps a source uid/gid to a destination one. `-1` is accepted both in
/// and out and means "current user/group".
pub type IdMap = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

/// Where a pair is in its transfer, as reported to the file hook.
#[derive(Clone, Copy, Debug)]
pub enum TransferStatus<'a> {
    /// The transfer has started.
    InProgress,
    /// The transfer finished with the given outcome.
    Completed(std::result::Result<(), &'a EngineError>),
}

/// Called on the start and end of each pair's transfer. The byte counter
/// is live during a copy, so a hook may keep the [`Arc`] and poll it for
/// progress. Hooks must be safe for concurrent calls.
pub type FileHook =
    Arc<dyn Fn(&FileInfo, FileOperation, &Arc<AtomicU64>, TransferStatus<'_>) + Send + Sync>;

/// An in-progress upload. While [`Upload::run`] is executing,
/// [`Upload::stats`] can be polled for progress.
pub struct Upload {
    src: Arc<dyn ReadableFileSystem>,
    dest: Arc<dyn WriteableFileSystem>,
    ignore: IgnoreFilter,
    nconc: usize,

    src_links: LinkSet,
    uid_map: IdMap,
    gid_map: IdMap,

    stats: UploadCounters,
    file_hook: FileHook,
}

impl Upload {
    /// Creates an upload from `src` to `dest` with default options:
    /// 128 workers, no ignore filter, identity id maps, no hook.
    #[must_use]
    pub fn new(dest: Arc<dyn WriteableFileSystem>, src: Arc<dyn ReadableFileSystem>) -> Self {
        Self {
            src,
            dest,
            ignore: Arc::new(|_| false),
            nconc: 128,
            src_links: LinkSet::new(),
            uid_map: Arc::new(|uid| uid),
            gid_map: Arc::new(|gid| gid),
            stats: UploadCounters::default(),
            file_hook: Arc::new(|_, _, _, _| {}),
        }
    }

    /// Sets the ignore filter. Matching files and directories are
    /// skipped and counted as ignored.
    #[must_use]
    pub fn with_ignore_filter(mut self, fun: IgnoreFilter) -> Self {
        self.ignore = fun;
        self
    }

    /// Sets the transfer concurrency, in files. Must be at least one.
    #[must_use]
    pub fn with_concurrency(mut self, nconc: usize) -> Self {
        assert!(nconc >= 1, "concurrency must be at least 1");
        self.nconc = nconc;
        self
    }

    /// Sets the per-file hook, invoked when a pair starts transferring
    /// and again when it completes.
    #[must_use]
    pub fn with_file_hook(mut self, fun: FileHook) -> Self {
        self.file_hook = fun;
        self
    }

    /// Sets the mapping from source uid to destination uid.
    #[must_use]
    pub fn with_uid_map(mut self, fun: IdMap) -> Self {
        self.uid_map = fun;
        self
    }

    /// Sets the mapping from source gid to destination gid.
    #[must_use]
    pub fn with_gid_map(mut self, fun: IdMap) -> Self {
        self.gid_map = fun;
        self
    }

    /// Performs the parallel transfer. Only one `run` should be
    /// executing per upload.
    pub fn run(&self, token: &CancelToken) -> Result<()> {
        let process = Process {
            src: &*self.src,
            dest: &*self.dest,
            ignore: &*self.ignore,
            nconc: self.nconc,
            stats: &self.stats.process,
            transfer: |t: &CancelToken, fp: &FilePair| self.transfer_pair(t, fp),
        };
        process.run(token)
    }

    /// Returns a snapshot of the upload statistics. May be called while
    /// `run` is executing.
    #[must_use]
    pub fn stats(&self) -> UploadStats {
        self.stats.snapshot(self.src_links.len())
    }

    /// Ensures a single pair has been fully transferred, retrying
    /// transient failures.
    fn transfer_pair(&self, token: &CancelToken, fp: &FilePair) -> Result<()> {
        let op = fp.operation();
        let bytes = Arc::new(AtomicU64::new(0));
        (self.file_hook)(fp.file_info(), op, &bytes, TransferStatus::InProgress);

        let mut attempts = 0u32;
        let result = retry::idempotent(token, || {
            self.stats.set_last(&fp.path, op);

            attempts += 1;
            if attempts > 1 {
                self.stats.transfer_retries.fetch_add(1, Ordering::Relaxed);
            }

            match fp.file_info().kind() {
                FileKind::Directory => self.transfer_directory(fp),
                FileKind::Regular | FileKind::Symlink => self.transfer_file(fp, &bytes),
                FileKind::Special => {
                    info!(path = %fp.path, "ignored special file");
                    Ok(())
                }
            }
        });

        (self.file_hook)(
            fp.file_info(),
            op,
            &bytes,
            TransferStatus::Completed(result.as_ref().map(|_| ())),
        );
        result
    }

    /// Transfers a single file or symlink from source to destination.
    fn transfer_file(&self, fp: &FilePair, bytes: &Arc<AtomicU64>) -> Result<()> {
        let Some(src) = &fp.src else {
            // Removed file.
            debug!(path = %fp.path, "removing file");
            self.dest.remove(&fp.path)?;
            self.stats.removed_files.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let result = match self.src_links.finished_file(&fp.path, src) {
            LinkOffer::LinkTo(_, first_path) => {
                debug!(path = %fp.path, first = %first_path, "hardlinking file");
                self.stats.uploaded_files.fetch_add(1, Ordering::Relaxed);
                self.dest.link(&first_path, &fp.path).map_err(EngineError::from)
            }
            LinkOffer::Materialize(inode) => {
                let result = self.transfer_file_contents(fp, src, bytes);
                match &result {
                    Ok(()) | Err(EngineError::Discarded) => self.src_links.fulfill(inode),
                    Err(_) => self.src_links.discard(inode, &fp.path),
                }
                result
            }
            LinkOffer::NotShared => self.transfer_file_contents(fp, src, bytes),
        };

        match result {
            // The pair legitimately disappeared from the source.
            Err(EngineError::Discarded) => Ok(()),
            other => other,
        }
    }

    fn transfer_file_contents(
        &self,
        fp: &FilePair,
        src: &FileInfo,
        bytes: &Arc<AtomicU64>,
    ) -> Result<()> {
        if !file_needs_transfer(fp.dest.as_ref(), src) {
            debug!(path = %fp.path, "keeping file");
            match self.dest.keep(&fp.path) {
                Ok(()) => {
                    let dest_size = fp.dest.as_ref().map_or(0, FileInfo::size);
                    self.stats.kept_bytes.fetch_add(dest_size, Ordering::Relaxed);
                    self.stats.kept_files.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(err) => trace!(path = %fp.path, error = %err, "failed to keep"),
            }
            // Fall back to a full transfer.
        }

        if src.is_symlink() {
            self.create_symlink(fp)
        } else {
            self.copy_file(fp, src, bytes)
        }
    }

    fn create_symlink(&self, fp: &FilePair) -> Result<()> {
        let target = match self.src.readlink(&fp.path) {
            Ok(target) => target,
            Err(err) if err.is_not_found() => {
                // The symlink was removed between listing and transfer.
                self.stats.discarded_files.fetch_add(1, Ordering::Relaxed);
                return Err(EngineError::Discarded);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(path = %fp.path, target = %target, "symlinking");
        match self.dest.symlink(&target, &fp.path) {
            // Replace a stale link in place, like create does for files.
            Err(err) if err.is_already_exists() => {
                self.dest.remove(&fp.path)?;
                self.dest.symlink(&target, &fp.path)?;
            }
            Err(err) => return Err(err.into()),
            Ok(()) => {}
        }
        self.stats
            .uploaded_bytes
            .fetch_add(target.as_str().len() as u64, Ordering::Relaxed);
        self.stats.uploaded_files.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Copies a file byte-by-byte.
    fn copy_file(&self, fp: &FilePair, src: &FileInfo, bytes: &Arc<AtomicU64>) -> Result<()> {
        let mut reader = match self.src.open(&fp.path) {
            Ok(reader) => reader,
            Err(err) if err.is_not_found() => {
                // The file was removed between listing and transfer.
                self.stats.discarded_files.fetch_add(1, Ordering::Relaxed);
                return Err(EngineError::Discarded);
            }
            Err(err) => return Err(err.into()),
        };

        let writer = match self.dest.create(&fp.path) {
            Err(err) if err.is_permission() => {
                // Remove the destination file and try again, so read-only
                // files can be overwritten.
                let _ = self.dest.remove(&fp.path);
                self.dest.create(&fp.path)?
            }
            other => other?,
        };

        let result = self
            .write_contents(fp, src, &mut *reader, writer, bytes)
            .and_then(|(atime, copied)| {
                self.dest.chtimes(&fp.path, atime, src.mtime())?;
                Ok(copied)
            });
        match result {
            Ok(copied) => {
                self.stats.uploaded_bytes.fetch_add(copied, Ordering::Relaxed);
                self.stats.uploaded_files.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                // Do not leave a truncated remainder for the next run.
                let _ = self.dest.remove(&fp.path);
                Err(err)
            }
        }
    }

    fn write_contents(
        &self,
        fp: &FilePair,
        src: &FileInfo,
        reader: &mut dyn fsys::FileReader,
        mut writer: Box<dyn fsys::FileWriter>,
        bytes: &Arc<AtomicU64>,
    ) -> Result<(SystemTime, u64)> {
        writer.chmod(src.mode() & COMMON_MODE_MASK)?;

        debug!(path = %fp.path, size = src.size(), "uploading file");
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut copied = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| fsys::FsError::from_io(fp.path.as_str(), e))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .map_err(|e| fsys::FsError::from_io(fp.path.as_str(), e))?;
            copied += n as u64;
            bytes.store(copied, Ordering::Relaxed);
        }

        let (uid, gid, atime) = src.ownership();
        let uid = (self.uid_map)(uid);
        let gid = (self.gid_map)(gid);
        if uid != -1 || gid != -1 {
            writer.chown(uid, gid)?;
        }

        writer.close()?;
        Ok((atime, copied))
    }

    /// Transfers a single directory.
    fn transfer_directory(&self, fp: &FilePair) -> Result<()> {
        let Some(src) = &fp.src else {
            // Removed directory.
            debug!(path = %fp.path, "removing directory");
            self.dest.remove_all(&fp.path)?;
            self.stats.removed_directories.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        if !directory_needs_transfer(fp.dest.as_ref(), src) {
            debug!(path = %fp.path, "keeping directory");
            match self.dest.keep(&fp.path) {
                Ok(()) => {
                    self.stats.kept_directories.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(err) => trace!(path = %fp.path, error = %err, "failed to keep"),
            }
            // Fall back to a normal transfer.
        }

        self.make_directory(fp, src)
    }

    fn make_directory(&self, fp: &FilePair, src: &FileInfo) -> Result<()> {
        let (uid, gid, atime) = src.ownership();
        let uid = (self.uid_map)(uid);
        let gid = (self.gid_map)(gid);
        // Owner-write is forced so the engine can keep writing inside.
        let mode = src.mode() & COMMON_MODE_MASK | OWNER_WRITE;

        if fp.dest.is_none() {
            debug!(path = %fp.path, "creating directory");
            self.dest.mkdir(&fp.path, mode, uid, gid)?;
        } else {
            debug!(path = %fp.path, "updating directory");
            match self.dest.mkdir(&fp.path, mode, uid, gid) {
                // AlreadyExists is the expected outcome: refresh the
                // metadata in place, like create does for files.
                Err(err) if err.is_already_exists() => {
                    if uid != -1 || gid != -1 {
                        self.dest.lchown(&fp.path, uid, gid)?;
                    }
                    self.dest.chmod(&fp.path, mode)?;
                }
                Err(err) => return Err(err.into()),
                Ok(()) => {}
            }
        }

        // This may be overwritten as entries are created inside the
        // directory.
        self.dest.chtimes(&fp.path, atime, src.mtime())?;

        if fp.dest.is_none() {
            self.stats.created_directories.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.updated_directories.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
