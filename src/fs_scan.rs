use crate::error::ScanError;
use crate::types::{FileEntry, Snapshot};
use globset::{GlobBuilder, GlobMatcher};
use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use time::OffsetDateTime;
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

/// Poll cadence when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Compile a file-name glob ("*.xml", "order_??.json", ...).
///
/// Matched against the file name only, so `*` can never reach into
/// subdirectories. Case-insensitive on Windows like the native listing APIs.
pub fn compile_filter(filter: &str) -> Result<GlobMatcher, ScanError> {
    GlobBuilder::new(filter)
        .literal_separator(true)
        .case_insensitive(cfg!(windows))
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| ScanError::InvalidFilter {
            filter: filter.to_string(),
            source,
        })
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}

/// Build the descriptor for one listed entry.
pub fn stat_entry(entry: &DirEntry) -> Result<FileEntry, walkdir::Error> {
    let meta = entry.metadata()?;

    Ok(FileEntry {
        path: entry.path().to_path_buf(),
        file_name: entry.file_name().to_string_lossy().to_string(),
        size: meta.len(),
        // platforms without mtime support keep a fixed epoch, so only size tells changes apart
        modified_at: meta
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH),
    })
}

/// One listing of the regular files directly inside `dir` whose name matches
/// `filter`. Directories are skipped; symlinks are judged by their target.
///
/// An entry that vanishes between the listing and its `stat` is left out of
/// this snapshot; any other failure is returned as a listing fault, and so is
/// a `dir` that is not a directory.
pub fn list_matching(dir: &Path, filter: &GlobMatcher) -> Result<Snapshot, ScanError> {
    let fault = |source: walkdir::Error| ScanError::Listing {
        dir: dir.to_path_buf(),
        source,
    };

    let mut out = Vec::new();

    let walker = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // dangling symlink or a racing delete of an entry, not of the directory itself
            Err(e) if e.depth() > 0 && is_not_found(&e) => {
                trace!(error = %e, "skipping vanished entry");
                continue;
            }
            Err(e) => return Err(fault(e)),
        };

        if entry.depth() == 0 {
            if !entry.file_type().is_dir() {
                return Err(ScanError::NotADirectory {
                    dir: dir.to_path_buf(),
                });
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if !filter.is_match(entry.file_name()) {
            continue;
        }

        match stat_entry(&entry) {
            Ok(file) => out.push(file),
            Err(e) if is_not_found(&e) => {
                trace!(path = %entry.path().display(), "entry vanished before stat");
            }
            Err(e) => return Err(fault(e)),
        }
    }

    Ok(out)
}

/// Endless sequence of snapshots of one directory.
///
/// The first `next` lists immediately; every later one sleeps `interval`
/// first, so consecutive listings are one interval apart and all blocking
/// happens on the thread pulling from the iterator. The sequence never ends
/// by itself: a listing fault is yielded as `Err` and polling continues if
/// the caller keeps pulling.
pub struct Poller {
    dir: PathBuf,
    filter: GlobMatcher,
    interval: Duration,
    ticks: u64,
}

impl Poller {
    pub fn new(dir: impl Into<PathBuf>, filter: GlobMatcher, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            filter,
            interval,
            ticks: 0,
        }
    }

    /// Listings produced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Iterator for Poller {
    type Item = Result<Snapshot, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ticks > 0 {
            thread::sleep(self.interval);
        }
        self.ticks += 1;

        let snapshot = list_matching(&self.dir, &self.filter);
        if let Ok(s) = &snapshot {
            debug!(dir = %self.dir.display(), tick = self.ticks, entries = s.len(), "listed");
        }
        Some(snapshot)
    }
}
