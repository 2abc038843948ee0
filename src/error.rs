use std::path::PathBuf;

/// Faults surfaced by a running scanner, either synchronously from `start`
/// or through the owner's `on_error` handler.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: globset::Error,
    },

    /// Listing the watched directory failed. Fatal to the background thread.
    #[error("listing {} failed: {source}", .dir.display())]
    Listing {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The watched path exists but is not a directory.
    #[error("{} is not a directory", .dir.display())]
    NotADirectory { dir: PathBuf },

    #[error("callback failed for {}: {source:#}", .path.display())]
    Callback {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("callback panicked for {}: {message}", .path.display())]
    CallbackPanic { path: PathBuf, message: String },

    #[error("failed to spawn scanner thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ScanError {
    /// Whether this fault ended the scan (as opposed to a per-file fault).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::Listing { .. } | ScanError::NotADirectory { .. } | ScanError::Spawn(_)
        )
    }
}
