//! Progress rendering on stderr.
//!
//! A monitor thread polls [`Upload::stats`] twice a second and rewrites
//! a single status line. Snapshots are taken without blocking the
//! transfer workers, so the numbers may trail the work by a moment.

use std::io::{self, Write};
use std::time::Duration;

use engine::{CancelToken, Upload, UploadStats};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Rewrites the status line until `stop` is cancelled, then clears it.
pub fn render_loop(upload: &Upload, stop: &CancelToken) {
    let mut stderr = io::stderr();
    loop {
        let stopped = stop.wait_timeout(POLL_INTERVAL);
        if stopped {
            let _ = write!(stderr, "\r\x1b[K");
            let _ = stderr.flush();
            return;
        }
        let line = format_status(&upload.stats());
        let _ = write!(stderr, "\r\x1b[K{line}");
        let _ = stderr.flush();
    }
}

/// One status line for the current snapshot.
fn format_status(stats: &UploadStats) -> String {
    let op = stats
        .last_operation()
        .map_or_else(|| "-".to_string(), |op| op.to_string());
    let path = stats.last_path().map_or("", |p| p.as_str());
    format!(
        "[{op}] up {} ({} files) kept {} ({} files) {} in flight  {path}",
        human_bytes(stats.uploaded_bytes),
        stats.uploaded_files,
        human_bytes(stats.kept_bytes),
        stats.kept_files,
        stats.process.in_progress,
    )
}

/// Prints the end-of-run totals.
pub fn print_summary<W: Write>(out: &mut W, stats: &UploadStats, elapsed: Duration) -> io::Result<()> {
    writeln!(
        out,
        "uploaded {} in {} files, kept {} in {} files",
        human_bytes(stats.uploaded_bytes),
        stats.uploaded_files,
        human_bytes(stats.kept_bytes),
        stats.kept_files,
    )?;
    writeln!(
        out,
        "dirs: {} created, {} updated, {} kept, {} removed",
        stats.created_directories,
        stats.updated_directories,
        stats.kept_directories,
        stats.removed_directories,
    )?;
    writeln!(
        out,
        "removed {} files, discarded {}, ignored {} files and {} dirs, {} retries",
        stats.removed_files,
        stats.discarded_files,
        stats.process.ignored_files,
        stats.process.ignored_directories,
        stats.transfer_retries,
    )?;
    writeln!(out, "elapsed: {:.1}s", elapsed.as_secs_f64())
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
