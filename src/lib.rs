//! Polling change detector for a single directory.
//!
//! Lists a directory every interval, diffs each listing against the previous
//! one by (path, size, mtime) and hands newly appeared files to a callback on
//! a background thread.

pub mod diff;
pub mod error;
pub mod fs_scan;
pub mod load;
pub mod scanner;
pub mod types;

pub use diff::{diff_list, differential, Differential};
pub use error::ScanError;
pub use fs_scan::{compile_filter, list_matching, Poller, DEFAULT_INTERVAL};
pub use load::load;
pub use scanner::{
    start_scanner, AddedEntries, EndReason, FolderScanner, ScanOptions, ScanSummary, Scanner,
    ScannerHandle, StopFlag,
};
pub use types::{Changes, FileEntry, Snapshot, SnapshotKey};
