//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the catalog engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Catalog synchronization events
    Sync(SyncEvent),
    /// Duplicate grouping events
    Duplicates(DuplicatesEvent),
}

/// States of a synchronization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Idle,
    /// Listing and classifying one folder
    Scanning { folder: PathBuf },
    /// Building catalog entries for a batch
    Batching { folder: PathBuf, size: usize },
    /// Writing a batch to the repository
    Committing { folder: PathBuf, size: usize },
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "Idle"),
            SyncState::Scanning { folder } => write!(f, "Scanning {}", folder.display()),
            SyncState::Batching { size, .. } => write!(f, "Building {} entries", size),
            SyncState::Committing { size, .. } => write!(f, "Committing {} entries", size),
        }
    }
}

/// Events during catalog synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A run has started
    Started { root: PathBuf },
    /// The run moved to a new state
    StateChanged { state: SyncState },
    /// A folder listing was compared with the catalog
    FolderClassified {
        folder: PathBuf,
        new: usize,
        modified: usize,
        renamed: usize,
        unchanged: usize,
        deleted: usize,
    },
    /// A file could not be decoded; it is cataloged as corrupted
    EntryCorrupted { path: PathBuf, message: String },
    /// A path could not be read and was skipped
    PathSkipped { path: PathBuf, message: String },
    /// A batch was committed to the repository
    BatchCommitted(SyncProgress),
    /// The run completed
    Completed(SyncSummary),
    /// The run stopped on an unrecoverable error
    Failed { message: String },
}

/// Progress information after a committed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Folder the batch belonged to
    pub folder: PathBuf,
    /// Entries in this batch
    pub batch_size: usize,
    /// Batches committed so far in this run
    pub batches_committed: usize,
    /// Folders processed so far
    pub folders_processed: usize,
    /// Folders this run will visit
    pub folders_total: usize,
}

/// Summary of a synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub folders_scanned: usize,
    pub added: usize,
    pub updated: usize,
    /// Entries whose stored name was changed to a new spelling
    pub renamed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub corrupted: usize,
    pub skipped: usize,
    pub batches_committed: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Whether the run changed the catalog
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.renamed + self.removed > 0
    }
}

/// Events during duplicate grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DuplicatesEvent {
    /// Grouping has started
    Started { total_entries: usize },
    /// Grouping completed
    Completed {
        total_sets: usize,
        total_duplicates: usize,
    },
}
