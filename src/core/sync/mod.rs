//! # Sync Module
//!
//! Brings the catalog in line with a directory tree.
//!
//! ## Run
//! ```text
//! Idle -> Scanning(folder) -> Batching -> Committing -> Scanning(next) ... -> Idle
//! ```
//! 1. Walk folders under the root depth-first, siblings in name order
//! 2. For each folder, list media files and classify them against the catalog
//! 3. Rename entries whose file changed only in case
//! 4. Build new and modified entries in parallel, one batch at a time
//! 5. Commit each batch; a failed commit stops the run. A folder new to the
//!    catalog is added by its first batch, so it never exists without entries
//! 6. Compact the thumbnail page of every folder that changed
//! 7. After the walk, remove deleted entries and orphaned folders
//! 8. Snapshot the catalog
//!
//! Entry building is a pure stage run on the rayon pool. Commits happen on
//! the calling thread only, so the repository sees a single writer.

pub mod listing;

use crate::config::CatalogConfig;
use crate::core::builder::CatalogEntryBuilder;
use crate::core::diff::{classify, ListedFile};
use crate::core::model::{normalize_folder_path, CatalogEntry, Folder, FolderId};
use crate::core::repository::{BatchOp, CatalogBatch, Repository};
use crate::core::storage::StorageAccess;
use crate::error::{RepositoryError, ScanError, SyncError};
use crate::events::{Event, EventSender, SyncEvent, SyncProgress, SyncState, SyncSummary};
use listing::{list_folder, walk_folders, MediaFilter, SkippedPath};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A file to (re)build, with the name it is stored under if it is cataloged
struct Pending<'a> {
    file: &'a ListedFile,
    stored_name: Option<&'a str>,
}

/// Counters for one run
#[derive(Default)]
struct RunState {
    summary: SyncSummary,
    folders_processed: usize,
    folders_total: usize,
}

/// Synchronizes a repository with the directory tree under the configured root
pub struct CatalogSynchronizer<'a> {
    config: CatalogConfig,
    storage: &'a dyn StorageAccess,
    filter: MediaFilter,
}

impl<'a> CatalogSynchronizer<'a> {
    pub fn new(config: CatalogConfig, storage: &'a dyn StorageAccess) -> Self {
        let filter = MediaFilter::new()
            .with_hidden(config.include_hidden)
            .with_videos(config.include_videos);

        Self {
            config,
            storage,
            filter,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Run one synchronization.
    ///
    /// Unreadable paths are skipped and undecodable files cataloged as
    /// corrupted; neither stops the run. A failed commit does: batches
    /// committed before it stay in the catalog.
    pub fn run(
        &self,
        repository: &mut Repository,
        events: &EventSender,
    ) -> Result<SyncSummary, SyncError> {
        let start = Instant::now();

        let root = std::fs::canonicalize(&self.config.root).map_err(|_| {
            self.fail(
                events,
                ScanError::DirectoryNotFound {
                    path: self.config.root.clone(),
                }
                .into(),
            )
        })?;

        info!("Synchronizing catalog with {}", root.display());
        events.send(Event::Sync(SyncEvent::Started { root: root.clone() }));

        let (folders, walk_skipped) =
            walk_folders(&root, &self.filter).map_err(|e| self.fail(events, e.into()))?;

        let mut state = RunState {
            folders_total: folders.len(),
            ..RunState::default()
        };
        // Folders that could not be walked keep their catalog entries
        let unreadable: Vec<String> = walk_skipped
            .iter()
            .map(|skipped| normalize_folder_path(&skipped.path))
            .collect();
        self.report_skipped(events, &mut state, walk_skipped);

        let builder = CatalogEntryBuilder::new(self.storage, &self.config);
        let mut visited: HashSet<String> = HashSet::new();
        let mut deletions: Vec<(FolderId, String)> = Vec::new();

        for folder in &folders {
            visited.insert(normalize_folder_path(folder));
            self.sync_folder(repository, events, &builder, folder, &mut state, &mut deletions)
                .map_err(|e| self.fail(events, e))?;
            state.folders_processed += 1;
        }

        let kept = |path: &str| {
            visited.contains(path) || unreadable.iter().any(|u| Path::new(path).starts_with(u))
        };
        self.remove_deleted(repository, events, &root, &kept, deletions, &mut state)
            .map_err(|e| self.fail(events, e))?;

        if let Err(e) = repository.backup() {
            warn!("Catalog backup failed: {}", e);
        }

        state.summary.duration_ms = start.elapsed().as_millis() as u64;
        self.set_state(events, SyncState::Idle);
        events.send(Event::Sync(SyncEvent::Completed(state.summary.clone())));

        info!(
            "Synchronization complete: {} added, {} updated, {} renamed, {} removed, {} unchanged, {} corrupted, {} skipped",
            state.summary.added,
            state.summary.updated,
            state.summary.renamed,
            state.summary.removed,
            state.summary.unchanged,
            state.summary.corrupted,
            state.summary.skipped
        );

        Ok(state.summary)
    }

    fn sync_folder(
        &self,
        repository: &mut Repository,
        events: &EventSender,
        builder: &CatalogEntryBuilder<'_>,
        path: &Path,
        state: &mut RunState,
        deletions: &mut Vec<(FolderId, String)>,
    ) -> Result<(), SyncError> {
        self.set_state(
            events,
            SyncState::Scanning {
                folder: path.to_path_buf(),
            },
        );
        state.summary.folders_scanned += 1;

        let listing = match list_folder(path, &self.filter) {
            Ok(listing) => listing,
            Err(e) => {
                // Keep what the catalog knows about a folder we cannot read
                self.report_skipped(
                    events,
                    state,
                    vec![SkippedPath {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }],
                );
                return Ok(());
            }
        };
        self.report_skipped(events, state, listing.skipped);

        if listing.files.is_empty() && repository.folder_by_path(path).is_none() {
            return Ok(());
        }

        // Added by the first batch that commits entries into it
        let (folder, mut unsaved) = match repository.folder_by_path(path) {
            Some(folder) => (folder.clone(), None),
            None => {
                let folder = Folder::new(path);
                (folder.clone(), Some(folder))
            }
        };
        let diff = classify(
            &listing.files,
            repository.entries_in_folder(folder.id),
            builder.fingerprint_kinds(),
        );

        debug!(
            "{}: {} new, {} modified, {} renamed, {} unchanged, {} deleted",
            path.display(),
            diff.new.len(),
            diff.modified.len(),
            diff.renamed.len(),
            diff.unchanged.len(),
            diff.deleted.len()
        );
        events.send(Event::Sync(SyncEvent::FolderClassified {
            folder: path.to_path_buf(),
            new: diff.new.len(),
            modified: diff.modified.len(),
            renamed: diff.renamed.len(),
            unchanged: diff.unchanged.len(),
            deleted: diff.deleted.len(),
        }));

        state.summary.unchanged += diff.unchanged.len();
        deletions.extend(
            diff.deleted
                .iter()
                .map(|entry| (folder.id, entry.file_name.clone())),
        );

        let mut pending: Vec<Pending<'_>> = diff
            .new
            .iter()
            .map(|file| Pending {
                file,
                stored_name: None,
            })
            .chain(diff.modified.iter().map(|m| Pending {
                file: &m.file,
                stored_name: Some(m.previous.file_name.as_str()),
            }))
            .collect();
        pending.sort_by(|a, b| a.file.name.cmp(&b.file.name));
        let mut touched = false;

        for chunk in diff.renamed.chunks(self.config.batch_size.max(1)) {
            self.set_state(
                events,
                SyncState::Committing {
                    folder: path.to_path_buf(),
                    size: chunk.len(),
                },
            );
            let mut batch = CatalogBatch::new();
            for renamed in chunk {
                debug!(
                    "Renaming {} to {} in {}",
                    renamed.previous.file_name,
                    renamed.file.name,
                    path.display()
                );
                batch.rename(folder.id, &renamed.previous.file_name, &renamed.file.name);
            }
            repository
                .commit(batch)
                .map_err(|source| commit_failed(path, state, source))?;

            touched = true;
            state.summary.renamed += chunk.len();
            self.batch_committed(events, state, path, chunk.len());
        }

        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            self.set_state(
                events,
                SyncState::Batching {
                    folder: path.to_path_buf(),
                    size: chunk.len(),
                },
            );

            let built: Vec<_> = chunk
                .par_iter()
                .map(|item| builder.build(folder.id, item.file))
                .collect();

            let mut ops: Vec<BatchOp> = Vec::with_capacity(chunk.len());
            let (mut added, mut updated) = (0, 0);

            for (item, result) in chunk.iter().zip(built) {
                match result {
                    Ok(entry) => {
                        self.report_corrupted(events, state, item.file, &entry);
                        match item.stored_name {
                            Some(stored) => {
                                if stored != entry.file_name {
                                    ops.push(BatchOp::Remove {
                                        folder_id: folder.id,
                                        file_name: stored.to_string(),
                                    });
                                }
                                updated += 1;
                            }
                            None => added += 1,
                        }
                        ops.push(BatchOp::Upsert(entry));
                    }
                    Err(e) => self.report_skipped(
                        events,
                        state,
                        vec![SkippedPath {
                            path: item.file.path.clone(),
                            message: e.to_string(),
                        }],
                    ),
                }
            }

            if ops.is_empty() {
                continue;
            }
            // A failed commit ends the run, so the folder is never added twice
            if let Some(new_folder) = unsaved.take() {
                ops.insert(0, BatchOp::AddFolder(new_folder));
            }
            let batch = CatalogBatch::from(ops);

            self.set_state(
                events,
                SyncState::Committing {
                    folder: path.to_path_buf(),
                    size: batch.len(),
                },
            );
            repository
                .commit(batch)
                .map_err(|source| commit_failed(path, state, source))?;

            touched = true;
            state.summary.added += added;
            state.summary.updated += updated;
            self.batch_committed(events, state, path, added + updated);
        }

        if touched {
            compact(repository, folder.id, path);
        }
        Ok(())
    }

    /// Apply deferred deletions, including every entry of folders under the
    /// root that were not seen in this run, then drop folders left empty
    fn remove_deleted(
        &self,
        repository: &mut Repository,
        events: &EventSender,
        root: &Path,
        kept: &dyn Fn(&str) -> bool,
        mut deletions: Vec<(FolderId, String)>,
        state: &mut RunState,
    ) -> Result<(), SyncError> {
        let root_key = normalize_folder_path(root);

        let vanished: Vec<FolderId> = repository
            .folders()
            .filter(|f| f.is_within(&root_key) && !kept(&f.path))
            .map(|f| f.id)
            .collect();
        for folder in &vanished {
            deletions.extend(
                repository
                    .entries_in_folder(*folder)
                    .map(|entry: &CatalogEntry| (*folder, entry.file_name.clone())),
            );
        }

        for chunk in deletions.chunks(self.config.batch_size.max(1)) {
            self.set_state(
                events,
                SyncState::Committing {
                    folder: root.to_path_buf(),
                    size: chunk.len(),
                },
            );

            let mut batch = CatalogBatch::new();
            for (folder, name) in chunk {
                batch.remove(*folder, name.clone());
            }
            repository
                .commit(batch)
                .map_err(|source| commit_failed(root, state, source))?;

            state.summary.removed += chunk.len();
            self.batch_committed(events, state, root, chunk.len());
        }
        let touched: BTreeSet<FolderId> = deletions.iter().map(|(folder, _)| *folder).collect();

        let empty: Vec<(FolderId, PathBuf)> = repository
            .folders()
            .filter(|f| f.is_within(&root_key))
            .filter(|f| repository.entries_in_folder(f.id).next().is_none())
            .map(|f| (f.id, f.path_buf()))
            .collect();
        for (folder, path) in empty {
            repository
                .remove_folder(folder)
                .map_err(|source| commit_failed(&path, state, source))?;
        }

        for folder in touched {
            if let Some(path) = repository.folder(folder).map(|f| f.path_buf()) {
                compact(repository, folder, &path);
            }
        }

        Ok(())
    }

    fn batch_committed(&self, events: &EventSender, state: &mut RunState, folder: &Path, size: usize) {
        state.summary.batches_committed += 1;
        info!(
            "Committed batch {} ({} entries) for {}",
            state.summary.batches_committed,
            size,
            folder.display()
        );
        events.send(Event::Sync(SyncEvent::BatchCommitted(SyncProgress {
            folder: folder.to_path_buf(),
            batch_size: size,
            batches_committed: state.summary.batches_committed,
            folders_processed: state.folders_processed,
            folders_total: state.folders_total,
        })));
    }

    fn report_corrupted(
        &self,
        events: &EventSender,
        state: &mut RunState,
        file: &ListedFile,
        entry: &CatalogEntry,
    ) {
        if !entry.corrupted.set {
            return;
        }
        let message = entry.corrupted.message.clone().unwrap_or_default();
        warn!("Corrupted media {}: {}", file.path.display(), message);
        state.summary.corrupted += 1;
        events.send(Event::Sync(SyncEvent::EntryCorrupted {
            path: file.path.clone(),
            message,
        }));
    }

    fn report_skipped(&self, events: &EventSender, state: &mut RunState, skipped: Vec<SkippedPath>) {
        for path in skipped {
            warn!("Skipping {}: {}", path.path.display(), path.message);
            state.summary.skipped += 1;
            events.send(Event::Sync(SyncEvent::PathSkipped {
                path: path.path,
                message: path.message,
            }));
        }
    }

    fn set_state(&self, events: &EventSender, state: SyncState) {
        events.send(Event::Sync(SyncEvent::StateChanged { state }));
    }

    fn fail(&self, events: &EventSender, error: SyncError) -> SyncError {
        warn!("Synchronization failed: {}", error);
        events.send(Event::Sync(SyncEvent::Failed {
            message: error.to_string(),
        }));
        self.set_state(events, SyncState::Idle);
        error
    }
}

/// Compaction only reclaims space, so a failure is logged and the run goes on
fn compact(repository: &mut Repository, folder: FolderId, path: &Path) {
    if let Err(e) = repository.compact_thumbnails(folder) {
        warn!("Could not compact thumbnails of {}: {}", path.display(), e);
    }
}

fn commit_failed(folder: &Path, state: &RunState, source: RepositoryError) -> SyncError {
    SyncError::CommitFailed {
        folder: folder.to_path_buf(),
        committed_batches: state.summary.batches_committed,
        source,
    }
}
