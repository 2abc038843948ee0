//! Background folder scanner.
//!
//! `Poller` -> `differential` -> [`AddedEntries`] -> callback, all pulled by one
//! dedicated thread. Deleted entries are computed by the diff and dropped here.
//!
//! Stopping is cooperative: the flag is read once per poll tick, after the
//! tick's listing and before its additions are delivered. A batch that is
//! already being delivered is finished. Since the poller is a lazy iterator
//! driven by that same thread, the thread (and with it the poll loop) ends at
//! the first checkpoint after `stop()`, i.e. at most one interval plus one
//! listing later. Dropping the [`ScannerHandle`] detaches the thread without
//! waiting for that.

use crate::diff::{differential, Differential};
use crate::error::ScanError;
use crate::fs_scan::{self, Poller, DEFAULT_INTERVAL};
use crate::load;
use crate::types::{Changes, FileEntry, SnapshotKey};
use std::any::Any;
use std::fs::File;
use std::io::BufReader;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Set-once stop request shared between the owner and the scan thread.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Contract shared by scanners: cooperative stop plus scoped file reading.
pub trait Scanner {
    fn is_done(&self) -> bool;

    /// Request a stop. Never undone.
    fn set_done(&self);

    /// See [`load::load`].
    fn load<T, F>(&self, path: impl AsRef<Path>, transform: F) -> anyhow::Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut BufReader<File>) -> anyhow::Result<T>,
    {
        load::load(path, transform)
    }
}

/// Flattens the `added` half of each tick into single entries, checking the
/// stop flag before taking each new tick.
///
/// Ends after the first source error (which is yielded) or once the flag is
/// seen set.
pub struct AddedEntries<I, T> {
    changes: I,
    batch: std::vec::IntoIter<T>,
    done: StopFlag,
    finished: bool,
}

impl<I, T> AddedEntries<I, T> {
    pub fn new(changes: I, done: StopFlag) -> Self {
        Self {
            changes,
            batch: Vec::new().into_iter(),
            done,
            finished: false,
        }
    }
}

impl<I, T, E> Iterator for AddedEntries<I, T>
where
    I: Iterator<Item = Result<Changes<T>, E>>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(t) = self.batch.next() {
                return Some(Ok(t));
            }
            if self.finished {
                return None;
            }

            let change = self.changes.next()?;
            if self.done.is_stopped() {
                self.finished = true;
                return None;
            }

            match change {
                Ok(Changes { added, deleted }) => {
                    if !added.is_empty() || !deleted.is_empty() {
                        debug!(added = added.len(), deleted = deleted.len(), "tick changes");
                    }
                    self.batch = added.into_iter();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EndReason {
    Stopped,
    ListingFault,
}

/// What the scan thread did before it returned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanSummary {
    /// Calls made to `on_added`, including ones that failed or panicked.
    pub invoked: u64,
    pub callback_faults: u64,
    pub ended_by: EndReason,
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

pub type KeyFn = fn(&FileEntry) -> SnapshotKey;

/// New entries of one polled directory, in delivery order.
pub type FolderEntries = AddedEntries<Differential<Poller, FileEntry, SnapshotKey, KeyFn>, FileEntry>;

/// Polls one directory for new files matching a glob.
#[derive(Clone, Debug)]
pub struct FolderScanner {
    dir: PathBuf,
    filter: String,
    options: ScanOptions,
}

impl FolderScanner {
    pub fn new(dir: impl Into<PathBuf>, filter: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            filter: filter.into(),
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.options.interval = interval;
        self
    }

    /// The lazy added-entry sequence, driven by whoever iterates it.
    pub fn added_entries(&self, done: StopFlag) -> Result<FolderEntries, ScanError> {
        let filter = fs_scan::compile_filter(&self.filter)?;
        let poller = Poller::new(self.dir.clone(), filter, self.options.interval);
        let to_key: KeyFn = FileEntry::key;
        Ok(AddedEntries::new(differential(poller, to_key), done))
    }

    /// Start the scan thread.
    ///
    /// `on_added` runs once per new entry on the scan thread, never
    /// concurrently with itself. An `Err` or panic from it goes to `on_error`
    /// and the scan carries on. A listing fault goes to `on_error` once and
    /// ends the scan.
    pub fn start<A, E>(self, mut on_added: A, mut on_error: E) -> Result<ScannerHandle, ScanError>
    where
        A: FnMut(FileEntry) -> anyhow::Result<()> + Send + 'static,
        E: FnMut(ScanError) + Send + 'static,
    {
        let done = StopFlag::new();
        let entries = self.added_entries(done.clone())?;
        let dir = self.dir.clone();

        let thread = thread::Builder::new()
            .name(format!("scan {}", dir.display()))
            .spawn(move || {
                info!(dir = %dir.display(), filter = %self.filter, interval = ?self.options.interval, "scanner started");

                let mut summary = ScanSummary {
                    invoked: 0,
                    callback_faults: 0,
                    ended_by: EndReason::Stopped,
                };

                for item in entries {
                    match item {
                        Ok(entry) => {
                            summary.invoked += 1;
                            if let Err(e) = deliver(&mut on_added, entry) {
                                summary.callback_faults += 1;
                                warn!(error = %e, "callback failed");
                                on_error(e);
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "scanner stopped on listing fault");
                            summary.ended_by = EndReason::ListingFault;
                            on_error(e);
                        }
                    }
                }

                info!(
                    dir = %dir.display(),
                    invoked = summary.invoked,
                    callback_faults = summary.callback_faults,
                    ended_by = ?summary.ended_by,
                    "scanner finished"
                );
                summary
            })?;

        Ok(ScannerHandle { done, thread })
    }
}

/// Start a scanner with the default interval.
pub fn start_scanner<A, E>(
    dir: impl Into<PathBuf>,
    filter: impl Into<String>,
    on_added: A,
    on_error: E,
) -> Result<ScannerHandle, ScanError>
where
    A: FnMut(FileEntry) -> anyhow::Result<()> + Send + 'static,
    E: FnMut(ScanError) + Send + 'static,
{
    FolderScanner::new(dir, filter).start(on_added, on_error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn deliver<A>(on_added: &mut A, entry: FileEntry) -> Result<(), ScanError>
where
    A: FnMut(FileEntry) -> anyhow::Result<()>,
{
    let path = entry.path.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| on_added(entry))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ScanError::Callback { path, source }),
        Err(payload) => Err(ScanError::CallbackPanic {
            path,
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Owner's side of a running scanner.
pub struct ScannerHandle {
    done: StopFlag,
    thread: JoinHandle<ScanSummary>,
}

impl ScannerHandle {
    /// A clone of the stop flag, e.g. for a signal handler.
    pub fn stop_flag(&self) -> StopFlag {
        self.done.clone()
    }

    /// Whether the scan thread has returned (stopped or hit a listing fault).
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the scan thread. Without a prior `set_done` this only returns
    /// after a listing fault.
    pub fn join(self) -> thread::Result<ScanSummary> {
        self.thread.join()
    }
}

impl Scanner for ScannerHandle {
    fn is_done(&self) -> bool {
        self.done.is_stopped()
    }

    fn set_done(&self) {
        self.done.stop();
    }
}
