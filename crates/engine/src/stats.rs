//! Transfer statistics.
//!
//! Writers bump atomic counters; readers take [`snapshot`] copies.
//! Fields of a snapshot are read one atomic at a time, so the snapshot
//! as a whole is not a consistent cut: `uploaded_bytes` may lag
//! `uploaded_files` by a little while transfers are in flight.
//!
//! [`snapshot`]: UploadCounters::snapshot

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use fsys::Path;

use crate::pair::FileOperation;

/// Counters for the traversal itself.
#[derive(Default)]
pub(crate) struct ProcessCounters {
    pub in_progress: AtomicU32,

    pub source_bytes: AtomicU64,
    pub source_files: AtomicU64,
    pub source_directories: AtomicU64,

    pub ignored_files: AtomicU64,
    pub ignored_directories: AtomicU64,
}

impl ProcessCounters {
    fn snapshot(&self) -> ProcessStats {
        ProcessStats {
            in_progress: self.in_progress.load(Ordering::Relaxed),
            source_bytes: self.source_bytes.load(Ordering::Relaxed),
            source_files: self.source_files.load(Ordering::Relaxed),
            source_directories: self.source_directories.load(Ordering::Relaxed),
            ignored_files: self.ignored_files.load(Ordering::Relaxed),
            ignored_directories: self.ignored_directories.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the upload, including the embedded traversal counters.
#[derive(Default)]
pub(crate) struct UploadCounters {
    pub process: ProcessCounters,

    pub uploaded_bytes: AtomicU64,
    pub uploaded_files: AtomicU64,

    pub created_directories: AtomicU64,
    pub updated_directories: AtomicU64,

    pub kept_bytes: AtomicU64,
    pub kept_files: AtomicU64,
    pub kept_directories: AtomicU64,

    pub removed_files: AtomicU64,
    pub removed_directories: AtomicU64,

    pub discarded_files: AtomicU64,
    pub transfer_retries: AtomicU64,

    pub last_pair: Mutex<Option<(Path, FileOperation)>>,
}

impl UploadCounters {
    pub(crate) fn set_last(&self, path: &Path, op: FileOperation) {
        *self.last_pair.lock().unwrap_or_else(|e| e.into_inner()) = Some((path.clone(), op));
    }

    pub(crate) fn snapshot(&self, inode_table: usize) -> UploadStats {
        UploadStats {
            process: self.process.snapshot(),
            inode_table,
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            uploaded_files: self.uploaded_files.load(Ordering::Relaxed),
            created_directories: self.created_directories.load(Ordering::Relaxed),
            updated_directories: self.updated_directories.load(Ordering::Relaxed),
            kept_bytes: self.kept_bytes.load(Ordering::Relaxed),
            kept_files: self.kept_files.load(Ordering::Relaxed),
            kept_directories: self.kept_directories.load(Ordering::Relaxed),
            removed_files: self.removed_files.load(Ordering::Relaxed),
            removed_directories: self.removed_directories.load(Ordering::Relaxed),
            discarded_files: self.discarded_files.load(Ordering::Relaxed),
            transfer_retries: self.transfer_retries.load(Ordering::Relaxed),
            last_pair: self
                .last_pair
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// A snapshot of traversal statistics.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessStats {
    /// Pairs currently being processed.
    pub in_progress: u32,
    /// Bytes of regular files and symlinks seen at the source.
    pub source_bytes: u64,
    /// Regular files and symlinks seen at the source.
    pub source_files: u64,
    /// Directories seen at the source.
    pub source_directories: u64,
    /// Files skipped by the ignore filter.
    pub ignored_files: u64,
    /// Directories skipped by the ignore filter.
    pub ignored_directories: u64,
}

/// A snapshot of upload statistics.
#[derive(Clone, Debug, Default)]
pub struct UploadStats {
    /// Traversal statistics.
    pub process: ProcessStats,

    /// Outstanding records in the hardlink coordination set.
    pub inode_table: usize,

    /// Bytes written to the destination.
    pub uploaded_bytes: u64,
    /// Files and symlinks written to the destination, including
    /// hardlinked holders.
    pub uploaded_files: u64,

    /// Directories created at the destination.
    pub created_directories: u64,
    /// Directories whose metadata was refreshed at the destination.
    pub updated_directories: u64,

    /// Bytes kept as-is at the destination.
    pub kept_bytes: u64,
    /// Files kept as-is.
    pub kept_files: u64,
    /// Directories kept as-is.
    pub kept_directories: u64,

    /// Files removed from the destination.
    pub removed_files: u64,
    /// Directories removed from the destination.
    pub removed_directories: u64,

    /// Source files that vanished between listing and transfer.
    pub discarded_files: u64,
    /// Transfer attempts after the first, across all pairs.
    pub transfer_retries: u64,

    last_pair: Option<(Path, FileOperation)>,
}

impl UploadStats {
    /// The last path the transfer touched, for progress display.
    #[must_use]
    pub fn last_path(&self) -> Option<&Path> {
        self.last_pair.as_ref().map(|(p, _)| p)
    }

    /// The operation last performed.
    #[must_use]
    pub fn last_operation(&self) -> Option<FileOperation> {
        self.last_pair.as_ref().map(|(_, op)| *op)
    }
}
