use std::path::PathBuf;
use time::OffsetDateTime;

/// Fingerprint of a directory entry. Two entries are "the same file" iff their
/// keys are equal; nothing else (content, inode) is consulted.
///
/// A rewrite that keeps the size and lands within the filesystem's mtime
/// resolution produces an equal key and is not reported.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at_utc: OffsetDateTime,
}

/// Descriptor of one listed file, handed to the added-entry callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,

    /// mtime, normalized to UTC
    pub modified_at: OffsetDateTime,
}

impl FileEntry {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            path: self.path.clone(),
            size: self.size,
            modified_at_utc: self.modified_at,
        }
    }
}

/// One poll tick's listing. Order carries no meaning for diffing.
pub type Snapshot = Vec<FileEntry>;

/// Result of comparing two consecutive snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changes<T> {
    pub added: Vec<T>,
    pub deleted: Vec<T>,
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}
