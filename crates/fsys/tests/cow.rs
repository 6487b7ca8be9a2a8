//! Snapshot-layer behavior against a real local backend.

use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;
use std::sync::Arc;

use time::macros::datetime;

use fsys::{CowFs, LocalFs, Path, ReadableFileSystem, WriteableFileSystem};

const T0: time::OffsetDateTime = datetime!(2023-01-01 10:00:00 UTC);
const T1: time::OffsetDateTime = datetime!(2023-01-01 11:00:00 UTC);
const T2: time::OffsetDateTime = datetime!(2023-01-01 12:00:00 UTC);

fn backend(dir: &tempfile::TempDir) -> Arc<dyn WriteableFileSystem> {
    Arc::new(LocalFs::new(dir.path()))
}

#[test]
fn first_run_writes_into_fresh_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cow = CowFs::new(backend(&dir), "h", T0).expect("new");

    let mut w = cow.create(&Path::from("a")).expect("create");
    w.write_all(b"hello").expect("write");
    w.close().expect("close");

    let snap = dir.path().join("h/2023-01-01T10-00-00.000000");
    assert_eq!(std::fs::read(snap.join("a")).expect("read"), b"hello");
}

#[test]
fn finish_commits_three_symlinks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cow = CowFs::new(backend(&dir), "h", T0).expect("new");
    cow.create(&Path::from("a")).expect("create").close().expect("close");
    cow.finish().expect("finish");

    let ts = "2023-01-01T10-00-00.000000";
    let host_latest = std::fs::read_link(dir.path().join("h/.latest")).expect("host latest");
    assert_eq!(host_latest.to_string_lossy(), ts);
    let complete =
        std::fs::read_link(dir.path().join(format!("h/{ts}.complete"))).expect("complete");
    assert_eq!(complete.to_string_lossy(), ts);
    let global = std::fs::read_link(dir.path().join(".latest")).expect("global latest");
    assert_eq!(global.to_string_lossy(), format!("h/{ts}"));
}

#[test]
fn second_snapshot_reads_from_previous() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h", T0).expect("new");
    let mut w = first.create(&Path::from("a")).expect("create");
    w.write_all(b"v1").expect("write");
    w.close().expect("close");
    first.finish().expect("finish");

    let second = CowFs::new(backend(&dir), "h", T1).expect("new");
    assert_eq!(
        second.read_root().as_str(),
        "h/2023-01-01T10-00-00.000000"
    );
    let mut buf = String::new();
    second
        .open(&Path::from("a"))
        .expect("open")
        .read_to_string(&mut buf)
        .expect("read");
    assert_eq!(buf, "v1");
}

#[test]
fn keep_hardlinks_files_from_previous_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h", T0).expect("new");
    let mut w = first.create(&Path::from("a")).expect("create");
    w.write_all(b"shared").expect("write");
    w.close().expect("close");
    first.finish().expect("finish");

    let second = CowFs::new(backend(&dir), "h", T1).expect("new");
    second.keep(&Path::from("a")).expect("keep");

    let old = std::fs::metadata(dir.path().join("h/2023-01-01T10-00-00.000000/a")).expect("stat");
    let new = std::fs::metadata(dir.path().join("h/2023-01-01T11-00-00.000000/a")).expect("stat");
    assert_eq!(old.ino(), new.ino());
    assert_eq!(new.nlink(), 2);
}

#[test]
fn keep_recreates_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h", T0).expect("new");
    first.mkdir(&Path::from("d"), 0o755, -1, -1).expect("mkdir");
    first.finish().expect("finish");

    let second = CowFs::new(backend(&dir), "h", T1).expect("new");
    second.keep(&Path::from("d")).expect("keep");

    let meta = std::fs::metadata(dir.path().join("h/2023-01-01T11-00-00.000000/d")).expect("stat");
    assert!(meta.is_dir());
    // Owner-write is forced so the new snapshot can be populated.
    assert_eq!(meta.mode() & 0o200, 0o200);
}

#[test]
fn stale_timestamp_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h", T1).expect("new");
    first.create(&Path::from("a")).expect("create").close().expect("close");
    first.finish().expect("finish");

    assert!(CowFs::new(backend(&dir), "h", T0).is_err());
    assert!(CowFs::new(backend(&dir), "h", T1).is_err());
    assert!(CowFs::new(backend(&dir), "h", T2).is_ok());
}

#[test]
fn pre_existing_snapshot_directory_fails_first_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("h/2023-01-01T10-00-00.000000")).expect("mkdir");

    let cow = CowFs::new(backend(&dir), "h", T0).expect("new");
    let err = cow.create(&Path::from("a")).err().expect("must fail");
    assert!(err.is_already_exists());
}

#[test]
fn new_host_falls_back_to_global_latest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h1", T0).expect("new");
    let mut w = first.create(&Path::from("a")).expect("create");
    w.write_all(b"seed").expect("write");
    w.close().expect("close");
    first.finish().expect("finish");

    let other = CowFs::new(backend(&dir), "h2", T1).expect("new");
    assert_eq!(
        other.read_root().as_str(),
        "h1/2023-01-01T10-00-00.000000"
    );
    let mut buf = String::new();
    other
        .open(&Path::from("a"))
        .expect("open")
        .read_to_string(&mut buf)
        .expect("read");
    assert_eq!(buf, "seed");
}

#[test]
fn rename_materializes_carried_over_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = CowFs::new(backend(&dir), "h", T0).expect("new");
    let mut w = first.create(&Path::from("a")).expect("create");
    w.write_all(b"carry").expect("write");
    w.close().expect("close");
    first.finish().expect("finish");

    // "a" exists only in the previous snapshot; rename must carry it
    // into the write root before moving it.
    let second = CowFs::new(backend(&dir), "h", T1).expect("new");
    second.rename(&Path::from("a"), &Path::from("b")).expect("rename");

    let snap = dir.path().join("h/2023-01-01T11-00-00.000000");
    assert_eq!(std::fs::read(snap.join("b")).expect("read"), b"carry");
    assert!(!snap.join("a").exists());
    // The carried entry is a hardlink to the previous snapshot's file.
    let old = std::fs::metadata(dir.path().join("h/2023-01-01T10-00-00.000000/a")).expect("stat");
    let new = std::fs::metadata(snap.join("b")).expect("stat");
    assert_eq!(old.ino(), new.ino());
}

#[test]
fn rename_moves_freshly_written_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cow = CowFs::new(backend(&dir), "h", T0).expect("new");
    let mut w = cow.create(&Path::from("f")).expect("create");
    w.write_all(b"fresh").expect("write");
    w.close().expect("close");

    cow.rename(&Path::from("f"), &Path::from("g")).expect("rename");

    let snap = dir.path().join("h/2023-01-01T10-00-00.000000");
    assert_eq!(std::fs::read(snap.join("g")).expect("read"), b"fresh");
    assert!(!snap.join("f").exists());
}

#[test]
fn removals_are_implicit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cow = CowFs::new(backend(&dir), "h", T0).expect("new");
    cow.remove(&Path::from("whatever")).expect("remove is a no-op");
    cow.remove_all(&Path::from("whatever")).expect("remove_all is a no-op");
    // No write root was materialized by the no-ops.
    assert!(!dir.path().join("h").exists());
}
