#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The transfer engine of the treesync workspace. An [`Upload`] makes a
//! destination tree equivalent to a source tree, modulo an ignore filter,
//! preserving mode, ownership, and mtime:
//!
//! - a parallel depth-first traversal enumerates `(source, destination)`
//!   pairs under a bounded worker count;
//! - each pair is classified as [`FileOperation::Create`],
//!   [`FileOperation::Update`], [`FileOperation::Keep`], or
//!   [`FileOperation::Remove`] and executed against the destination
//!   backend;
//! - files sharing a source inode are materialized once and hardlinked by
//!   every other holder;
//! - transient transport errors are retried with capped exponential
//!   backoff.
//!
//! # Concurrency
//!
//! The engine runs `N` OS-level workers (default 128) over one shared
//! LIFO stack. No lock is held across an I/O call; workers block only on
//! the traversal condition variable, the hardlink coordination set, and
//! retry backoff, each of which a [`CancelToken`] unblocks in bounded
//! time.

mod cancel;
mod error;
mod linkset;
mod pair;
mod pdfs;
mod process;
mod retry;
mod stats;
mod upload;

pub use cancel::CancelToken;
pub use error::{EngineError, Result};
pub use pair::{FileOperation, FilePair};
pub use stats::{ProcessStats, UploadStats};
pub use upload::{FileHook, IdMap, IgnoreFilter, TransferStatus, Upload};
