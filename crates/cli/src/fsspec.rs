//! Parsing of file-system specification strings.
//!
//! A location is named by a spec:
//!
//! - `<path>` or `file://<path>` — a local tree rooted at `<path>`;
//! - `cow+file://<path>` — a copy-on-write snapshot layer over a local
//!   root, keyed by this machine's hostname;
//! - `<host>:<path>` or `sftp://<host>/<path>` — a remote SFTP tree,
//!   recognized but not supported by this build.

use std::path::PathBuf;
use std::sync::Arc;

use time::OffsetDateTime;

use fsys::{CowFs, LocalFs, ReadableFileSystem, WriteableFileSystem};

use crate::error::CliError;

/// A parsed file-system specification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FsSpec {
    /// A local tree.
    Local { root: PathBuf },
    /// A copy-on-write snapshot layer over a local tree.
    Cow { root: PathBuf },
    /// A remote SFTP tree.
    Remote { host: String, path: String },
}

/// Parses a spec string.
///
/// Strings without a scheme are shortcuts: `<host>:<path>` means SFTP
/// and a plain path means a local tree.
pub fn parse_spec(s: &str) -> Result<FsSpec, CliError> {
    if s.is_empty() {
        return Err(CliError::Spec("empty file-system spec".to_string()));
    }

    if let Some((scheme, rest)) = s.split_once("://") {
        return match scheme {
            "file" => Ok(FsSpec::Local { root: rest.into() }),
            "cow+file" => Ok(FsSpec::Cow { root: rest.into() }),
            "sftp" => {
                let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
                Ok(FsSpec::Remote {
                    host: host.to_string(),
                    path: path.to_string(),
                })
            }
            other => Err(CliError::Spec(format!("unknown scheme: {other}"))),
        };
    }

    if let Some((host, path)) = s.split_once(':') {
        return Ok(FsSpec::Remote {
            host: host.to_string(),
            path: path.to_string(),
        });
    }

    Ok(FsSpec::Local { root: s.into() })
}

/// Called when the transfer ends; `true` means the run succeeded and
/// the destination may commit.
pub type Finisher = Box<dyn FnOnce(bool) -> Result<(), CliError>>;

/// Builds the destination file system for a spec, plus its finisher.
/// The copy-on-write destination commits its snapshot only on success.
pub fn make_dest(spec: &FsSpec) -> Result<(Arc<dyn WriteableFileSystem>, Finisher), CliError> {
    match spec {
        FsSpec::Local { root } => Ok((
            Arc::new(LocalFs::new(root.clone())),
            Box::new(|_| Ok(())),
        )),
        FsSpec::Cow { root } => {
            let backend: Arc<dyn WriteableFileSystem> = Arc::new(LocalFs::new(root.clone()));
            let cow = Arc::new(CowFs::new(backend, &hostname()?, OffsetDateTime::now_utc())?);
            let finishing = Arc::clone(&cow);
            Ok((
                cow,
                Box::new(move |ok| {
                    if ok {
                        finishing.finish()?;
                    }
                    Ok(())
                }),
            ))
        }
        FsSpec::Remote { host, .. } => Err(CliError::Spec(format!(
            "remote backend not supported in this build: {host}"
        ))),
    }
}

/// Builds the source file system for a spec. A copy-on-write source
/// reads the most recent snapshot and never commits.
pub fn make_source(spec: &FsSpec) -> Result<Arc<dyn ReadableFileSystem>, CliError> {
    match spec {
        FsSpec::Local { root } => Ok(Arc::new(LocalFs::new(root.clone()))),
        FsSpec::Cow { root } => {
            let backend: Arc<dyn WriteableFileSystem> = Arc::new(LocalFs::new(root.clone()));
            Ok(Arc::new(CowFs::new(
                backend,
                &hostname()?,
                OffsetDateTime::now_utc(),
            )?))
        }
        FsSpec::Remote { host, .. } => Err(CliError::Spec(format!(
            "remote backend not supported in this build: {host}"
        ))),
    }
}

fn hostname() -> Result<String, CliError> {
    let uname = rustix::system::uname();
    let node = uname.nodename().to_string_lossy().into_owned();
    if node.is_empty() {
        return Err(CliError::Spec("cannot determine hostname".to_string()));
    }
    Ok(node)
}
