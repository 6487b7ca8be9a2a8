#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Command-line frontend for treesync. Parses the argument surface,
//! builds the source and destination backends from their spec strings,
//! compiles the ignore rules, wires up progress rendering, and drives
//! one [`engine::Upload`] run.

mod error;
mod fsspec;
mod idmap;
mod progress;

pub use error::CliError;
pub use fsspec::{parse_spec, FsSpec};

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::{ArgAction, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

use engine::{CancelToken, Upload};
use filters::IgnoreSet;

/// One-way file-tree synchronizer with hardlink deduplication and
/// copy-on-write snapshots.
#[derive(Debug, Parser)]
#[command(name = "treesync", version, about)]
struct Args {
    /// Source: a path, file://PATH, or cow+file://PATH
    src: String,

    /// Destination: a path, file://PATH, or cow+file://PATH
    dest: String,

    /// Number of parallel transfer workers
    #[arg(long, default_value_t = 128)]
    concurrency: usize,

    /// Newline-separated gitignore-style rules for entries to skip
    #[arg(long)]
    ignore: Option<String>,

    /// File with gitignore-style rules for entries to skip
    #[arg(long, value_name = "PATH")]
    ignore_file: Option<PathBuf>,

    /// How to map source uids: "id" (keep) or "current"
    #[arg(long, default_value = "id")]
    uid_map: String,

    /// How to map source gids: "id" (keep) or "current"
    #[arg(long, default_value = "id")]
    gid_map: String,

    /// Render a live status line on stderr
    #[arg(long)]
    progress: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Parses `args` and runs the transfer. Returns the process exit code.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    init_tracing(args.verbose);

    match transfer(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "transfer failed");
            eprintln!("treesync: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn transfer(args: &Args) -> Result<(), CliError> {
    let ignore = load_ignore(args)?;
    let uid_map = idmap::parse_id_map(&args.uid_map)?;
    let gid_map = idmap::parse_id_map(&args.gid_map)?;

    let src = fsspec::make_source(&parse_spec(&args.src)?)?;
    let (dest, finisher) = fsspec::make_dest(&parse_spec(&args.dest)?)?;

    let upload = Upload::new(dest, src)
        .with_concurrency(args.concurrency.max(1))
        .with_ignore_filter(Arc::new(move |path: &str| ignore.matches(path)))
        .with_uid_map(uid_map)
        .with_gid_map(gid_map);

    let token = CancelToken::new();
    let started = Instant::now();
    let upload_ref = &upload;
    let result = thread::scope(|scope| {
        let meter_stop = CancelToken::new();
        let meter = args.progress.then(|| {
            let stop = meter_stop.clone();
            scope.spawn(move || progress::render_loop(upload_ref, &stop))
        });

        let result = upload.run(&token);

        meter_stop.cancel();
        if let Some(handle) = meter {
            let _ = handle.join();
        }
        result
    });

    finisher(result.is_ok())?;
    result?;

    let mut stdout = std::io::stdout();
    progress::print_summary(&mut stdout, &upload.stats(), started.elapsed()).map_err(|e| {
        CliError::Io {
            path: "<stdout>".to_string(),
            source: e,
        }
    })?;
    Ok(())
}

fn load_ignore(args: &Args) -> Result<IgnoreSet, CliError> {
    let mut lines = String::new();
    if let Some(rules) = &args.ignore {
        lines.push_str(rules);
        lines.push('\n');
    }
    if let Some(path) = &args.ignore_file {
        let contents = std::fs::read_to_string(path).map_err(|e| CliError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        lines.push_str(&contents);
    }
    Ok(IgnoreSet::from_lines(&lines)?)
}
