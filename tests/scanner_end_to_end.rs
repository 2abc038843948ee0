use folder_scanner::{
    start_scanner, EndReason, FileEntry, FolderScanner, ScanError, Scanner, ScannerHandle,
};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tempfile::tempdir;

const INTERVAL: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(5);

/// Drop a file in atomically so no tick sees it half written.
fn drop_file(dir: &Path, name: &str, content: &str) {
    let tmp = dir.join(format!("{name}.part"));
    fs::write(&tmp, content).unwrap();
    fs::rename(&tmp, dir.join(name)).unwrap();
}

struct Running {
    handle: ScannerHandle,
    added: Receiver<FileEntry>,
    errors: Receiver<ScanError>,
}

fn start(dir: &Path, filter: &str, fail_on: Option<&'static str>) -> Running {
    let (add_tx, added) = mpsc::channel();
    let (err_tx, errors) = mpsc::channel();

    let handle = FolderScanner::new(dir, filter)
        .interval(INTERVAL)
        .start(
            move |entry: FileEntry| {
                let name = entry.file_name.clone();
                add_tx.send(entry)?;
                match fail_on {
                    Some(bad) if bad == name => anyhow::bail!("cannot parse {name}"),
                    _ => Ok(()),
                }
            },
            move |err| {
                let _ = err_tx.send(err);
            },
        )
        .unwrap();

    Running {
        handle,
        added,
        errors,
    }
}

fn names(rx: &Receiver<FileEntry>, n: usize) -> Vec<String> {
    (0..n)
        .map(|_| rx.recv_timeout(WAIT).unwrap().file_name)
        .collect()
}

fn assert_quiet(rx: &Receiver<FileEntry>) {
    match rx.recv_timeout(INTERVAL * 4) {
        Err(RecvTimeoutError::Timeout) => {}
        Ok(entry) => panic!("unexpected add {}", entry.file_name),
        Err(RecvTimeoutError::Disconnected) => panic!("scanner thread ended"),
    }
}

#[test]
fn test_new_files_are_delivered_once() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "a.xml", "<a/>");
    drop_file(dir.path(), "notes.txt", "skip me");

    let run = start(dir.path(), "*.xml", None);

    // tick 1: everything already present counts as added
    assert_eq!(names(&run.added, 1), vec!["a.xml"]);
    assert_quiet(&run.added);

    // tick n: only the new file
    drop_file(dir.path(), "b.xml", "<b/>");
    assert_eq!(names(&run.added, 1), vec!["b.xml"]);

    // deletions are computed but never delivered
    fs::remove_file(dir.path().join("a.xml")).unwrap();
    assert_quiet(&run.added);

    run.handle.set_done();
    let summary = run.handle.join().unwrap();
    assert_eq!(summary.invoked, 2);
    assert_eq!(summary.callback_faults, 0);
    assert_eq!(summary.ended_by, EndReason::Stopped);
    assert!(run.errors.try_recv().is_err());
}

#[test]
fn test_rewritten_file_is_delivered_again() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "a.xml", "<a/>");

    let run = start(dir.path(), "*.xml", None);
    let first = run.added.recv_timeout(WAIT).unwrap();

    drop_file(dir.path(), "a.xml", "<a>longer</a>");
    let second = run.added.recv_timeout(WAIT).unwrap();

    assert_eq!(first.path, second.path);
    assert_ne!(first.key(), second.key());
    run.handle.set_done();
}

#[test]
fn test_callback_error_does_not_stop_batch() {
    let dir = tempdir().unwrap();
    for name in ["x.xml", "y.xml", "z.xml"] {
        drop_file(dir.path(), name, name);
    }

    let run = start(dir.path(), "*.xml", Some("x.xml"));

    assert_eq!(names(&run.added, 3), vec!["x.xml", "y.xml", "z.xml"]);

    let err = run.errors.recv_timeout(WAIT).unwrap();
    match &err {
        ScanError::Callback { path, source } => {
            assert_eq!(path, &dir.path().join("x.xml"));
            assert!(source.to_string().contains("cannot parse x.xml"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!err.is_fatal());

    // still scanning after the fault
    drop_file(dir.path(), "w.xml", "w");
    assert_eq!(names(&run.added, 1), vec!["w.xml"]);

    run.handle.set_done();
    let summary = run.handle.join().unwrap();
    assert_eq!(summary.callback_faults, 1);
    assert_eq!(summary.invoked, 4);
    assert!(run.errors.try_recv().is_err());
}

#[test]
fn test_callback_panic_is_reported() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "a.xml", "a");
    drop_file(dir.path(), "b.xml", "b");
    let (tx, rx) = mpsc::channel();
    let (err_tx, err_rx) = mpsc::channel();

    let handle = FolderScanner::new(dir.path(), "*.xml")
        .interval(INTERVAL)
        .start(
            move |entry: FileEntry| {
                if entry.file_name == "a.xml" {
                    panic!("handler bug");
                }
                tx.send(entry.file_name)?;
                Ok(())
            },
            move |err| {
                let _ = err_tx.send(err);
            },
        )
        .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "b.xml");
    match err_rx.recv_timeout(WAIT).unwrap() {
        ScanError::CallbackPanic { message, .. } => assert_eq!(message, "handler bug"),
        other => panic!("unexpected {:?}", other),
    }

    handle.set_done();
    assert_eq!(handle.join().unwrap().ended_by, EndReason::Stopped);
}

#[test]
fn test_no_delivery_after_stop() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "a.xml", "a");

    let run = start(dir.path(), "*.xml", None);
    assert_eq!(names(&run.added, 1), vec!["a.xml"]);

    run.handle.set_done();
    assert!(run.handle.is_done());
    drop_file(dir.path(), "late.xml", "late");

    let summary = run.handle.join().unwrap();
    assert_eq!(summary.invoked, 1);
    assert!(run.added.try_recv().is_err());
}

#[test]
fn test_missing_directory_is_fatal_and_reported_once() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("translationrequest");

    let run = start(&missing, "*.xml", None);

    let err = run.errors.recv_timeout(WAIT).unwrap();
    assert!(matches!(err, ScanError::Listing { .. }));
    assert!(err.is_fatal());

    let summary = run.handle.join().unwrap();
    assert_eq!(summary.ended_by, EndReason::ListingFault);
    assert_eq!(summary.invoked, 0);
    assert!(run.errors.try_recv().is_err());
}

#[test]
fn test_directory_removed_while_scanning() {
    let dir = tempdir().unwrap();
    let watched = dir.path().join("inbox");
    fs::create_dir(&watched).unwrap();
    drop_file(&watched, "a.xml", "a");

    let run = start(&watched, "*.xml", None);
    assert_eq!(names(&run.added, 1), vec!["a.xml"]);

    fs::remove_dir_all(&watched).unwrap();

    let err = run.errors.recv_timeout(WAIT).unwrap();
    assert!(matches!(err, ScanError::Listing { .. }));
    assert_eq!(run.handle.join().unwrap().ended_by, EndReason::ListingFault);
}

#[test]
fn test_file_as_directory_is_fatal_and_reported_once() {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    fs::write(&inbox, "not a folder").unwrap();

    let run = start(&inbox, "*", None);

    let err = run.errors.recv_timeout(WAIT).unwrap();
    assert!(matches!(err, ScanError::NotADirectory { .. }));

    let summary = run.handle.join().unwrap();
    assert_eq!(summary.ended_by, EndReason::ListingFault);
    assert_eq!(summary.invoked, 0);
    assert!(run.errors.try_recv().is_err());
    assert!(run.added.try_recv().is_err());
}

#[test]
fn test_invalid_filter_fails_before_start() {
    let dir = tempdir().unwrap();

    let res = FolderScanner::new(dir.path(), "{*.xml").start(|_| Ok(()), |_| {});

    assert!(matches!(res, Err(ScanError::InvalidFilter { .. })));
}

#[test]
fn test_handle_load_reads_delivered_file() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "order.xml", "<order id=\"7\"/>");

    let run = start(dir.path(), "*.xml", None);
    let entry = run.added.recv_timeout(WAIT).unwrap();

    let content = run
        .handle
        .load(&entry.path, |r| {
            let mut s = String::new();
            r.read_to_string(&mut s)?;
            Ok(s)
        })
        .unwrap();
    assert_eq!(content, "<order id=\"7\"/>");

    assert!(run.handle.load(dir.path().join("missing.xml"), |_| Ok(())).is_err());
    run.handle.set_done();
}

#[test]
fn test_start_scanner_delivers_first_listing_immediately() {
    let dir = tempdir().unwrap();
    drop_file(dir.path(), "a.xml", "a");
    let (tx, rx) = mpsc::channel();

    // default 10s interval: only the first tick can happen within this test
    let handle = start_scanner(
        dir.path(),
        "*.xml",
        move |entry: FileEntry| {
            tx.send(entry.file_name)?;
            Ok(())
        },
        |_| {},
    )
    .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "a.xml");
    assert!(!handle.is_finished());
    handle.set_done();
}
