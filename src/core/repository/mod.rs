//! # Repository Module
//!
//! Durable catalog state: folders, catalog entries, thumbnails and sync
//! rules, with an in-memory index for fast reads.
//!
//! ## Layout
//! ```text
//! <catalog dir>/
//!   catalog.db                 SQLite records (folders, assets, sync_rules)
//!   thumbnails/<id>-<gen>.bin  append-only thumbnail page per folder
//!   backups/                   timestamped snapshots of catalog.db
//! ```
//!
//! ## Consistency
//! A [`CatalogBatch`] is applied in three steps:
//! 1. One frame is appended to the page of every folder it touches
//! 2. A single SQLite transaction writes the records together with the new
//!    committed length of each page
//! 3. The in-memory index is updated
//!
//! Page bytes past the committed length are never read, so the transaction
//! is the only commit point: if it fails, neither records nor thumbnails
//! change, and the index is left as it was.
//!
//! ## Recovery
//! If the database cannot be opened or fails its integrity check, the newest
//! snapshot is restored before giving up.

pub mod backup;
pub mod blobs;
pub mod index;
pub mod records;

pub use index::CatalogIndex;

use crate::core::fingerprint::FingerprintKind;
use crate::core::model::{normalize_folder_path, CatalogEntry, Folder, FolderId};
use crate::core::storage::StorageAccess;
use crate::error::RepositoryError;
use backup::BackupStore;
use blobs::{BlobStore, PageOp, PageRef};
use records::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Catalog format version; part of the catalog directory path
pub const CATALOG_VERSION: &str = "v2";

/// Snapshots kept unless configured otherwise
pub const DEFAULT_BACKUPS_TO_KEEP: usize = 3;

const DATABASE_FILE: &str = "catalog.db";

/// A folder-to-folder synchronization rule kept with the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub include_subfolders: bool,
    pub delete_not_in_source: bool,
}

/// One change in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Register a folder; later operations in the same batch may use it
    AddFolder(Folder),
    /// Insert or replace an entry, including its thumbnail payload if any
    Upsert(CatalogEntry),
    Remove {
        folder_id: FolderId,
        file_name: String,
    },
    /// Store an entry under a new file name, keeping its record and thumbnail
    Rename {
        folder_id: FolderId,
        from: String,
        to: String,
    },
}

impl BatchOp {
    fn folder_id(&self) -> FolderId {
        match self {
            BatchOp::AddFolder(folder) => folder.id,
            BatchOp::Upsert(entry) => entry.folder_id,
            BatchOp::Remove { folder_id, .. } | BatchOp::Rename { folder_id, .. } => *folder_id,
        }
    }

    /// The thumbnail page change this operation implies
    fn page_op(&self) -> Option<PageOp> {
        match self {
            BatchOp::AddFolder(_) => None,
            BatchOp::Upsert(entry) => Some(match &entry.thumbnail {
                Some(bytes) => PageOp::Insert {
                    name: entry.file_name.clone(),
                    bytes: bytes.clone(),
                },
                None => PageOp::Remove {
                    name: entry.file_name.clone(),
                },
            }),
            BatchOp::Remove { file_name, .. } => Some(PageOp::Remove {
                name: file_name.clone(),
            }),
            BatchOp::Rename { from, to, .. } => Some(PageOp::Rename {
                from: from.clone(),
                to: to.clone(),
            }),
        }
    }
}

/// A set of changes committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogBatch {
    ops: Vec<BatchOp>,
}

impl CatalogBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&mut self, folder: Folder) {
        self.ops.push(BatchOp::AddFolder(folder));
    }

    pub fn upsert(&mut self, entry: CatalogEntry) {
        self.ops.push(BatchOp::Upsert(entry));
    }

    pub fn remove(&mut self, folder_id: FolderId, file_name: impl Into<String>) {
        self.ops.push(BatchOp::Remove {
            folder_id,
            file_name: file_name.into(),
        });
    }

    pub fn rename(&mut self, folder_id: FolderId, from: impl Into<String>, to: impl Into<String>) {
        self.ops.push(BatchOp::Rename {
            folder_id,
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<BatchOp>> for CatalogBatch {
    fn from(ops: Vec<BatchOp>) -> Self {
        Self { ops }
    }
}

/// Catalog totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub folders: usize,
    pub entries: usize,
    pub corrupted: usize,
    pub rotated: usize,
    pub total_bytes: u64,
}

/// The catalog repository
///
/// Reads are served from the in-memory index and take `&self`; every write
/// takes `&mut self` and is durable before it becomes visible.
pub struct Repository {
    dir: PathBuf,
    records: RecordStore,
    blobs: BlobStore,
    backups: BackupStore,
    index: CatalogIndex,
}

impl Repository {
    /// Catalog directory inside a storage data root
    pub fn catalog_directory(storage: &dyn StorageAccess) -> PathBuf {
        storage
            .resolve_data_directory("catalog")
            .join(CATALOG_VERSION)
    }

    /// Open or create the catalog in `dir`
    pub fn open(dir: &Path) -> Result<Self, RepositoryError> {
        Self::open_with_backups(dir, DEFAULT_BACKUPS_TO_KEEP)
    }

    /// Open or create the catalog, keeping `backups_to_keep` snapshots
    pub fn open_with_backups(dir: &Path, backups_to_keep: usize) -> Result<Self, RepositoryError> {
        std::fs::create_dir_all(dir).map_err(|e| RepositoryError::OpenFailed {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let db_path = dir.join(DATABASE_FILE);
        let backups = BackupStore::new(dir.join("backups"), backups_to_keep);

        let (records, index) = match Self::load(&db_path) {
            Ok(loaded) => loaded,
            Err(error) => {
                warn!("Catalog at {} is unusable: {}", db_path.display(), error);
                match backups.restore_latest(&db_path) {
                    Ok(backup) => {
                        warn!("Recovered catalog from {}", backup.display());
                        Self::load(&db_path)?
                    }
                    Err(RepositoryError::NoBackupAvailable) => return Err(error),
                    Err(restore_error) => return Err(restore_error),
                }
            }
        };

        let blobs = BlobStore::new(dir.join("thumbnails"));
        match blobs.remove_orphans(index.pages()) {
            Ok(0) => {}
            Ok(removed) => debug!("Removed {} orphaned thumbnail pages", removed),
            Err(e) => warn!("Could not clean up thumbnail pages: {}", e),
        }

        info!(
            "Opened catalog at {} ({} folders, {} entries)",
            dir.display(),
            index.folder_count(),
            index.entry_count()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            records,
            blobs,
            backups,
            index,
        })
    }

    fn load(db_path: &Path) -> Result<(RecordStore, CatalogIndex), RepositoryError> {
        let records = RecordStore::open(db_path)?;
        records.check_integrity()?;
        let index = records.load()?;
        Ok((records, index))
    }

    /// Directory holding this catalog
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    // ---- Folders ----

    /// Folders in path order
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.index.folders()
    }

    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.index.folder(id)
    }

    pub fn folder_by_path(&self, path: &Path) -> Option<&Folder> {
        self.index.folder_by_path(&normalize_folder_path(path))
    }

    /// The folder for `path`, created if the catalog does not know it yet
    pub fn resolve_folder(&mut self, path: &Path) -> Result<Folder, RepositoryError> {
        if let Some(folder) = self.folder_by_path(path) {
            return Ok(folder.clone());
        }

        let folder = Folder::new(path);
        let mut batch = CatalogBatch::new();
        batch.add_folder(folder.clone());
        self.commit(batch)?;
        debug!("Added folder {}", folder.path);
        Ok(folder)
    }

    /// Remove an empty folder
    pub fn remove_folder(&mut self, id: FolderId) -> Result<(), RepositoryError> {
        let folder = self
            .index
            .folder(id)
            .cloned()
            .ok_or(RepositoryError::UnknownFolder(id))?;

        let entries = self.index.entry_count_in(id);
        if entries > 0 {
            return Err(RepositoryError::FolderInUse {
                path: folder.path,
                entries,
            });
        }

        let page = self.index.page(id);
        self.records.delete_folder(id)?;
        self.index.remove_folder(id);
        // An undeleted page is an orphan and goes on the next open
        if let Err(e) = self.blobs.delete(id, page) {
            warn!("Could not delete thumbnail page of {}: {}", folder.path, e);
        }
        debug!("Removed folder {}", folder.path);
        Ok(())
    }

    // ---- Entries ----

    pub fn entry(&self, folder: FolderId, file_name: &str) -> Option<&CatalogEntry> {
        self.index.entry(folder, file_name)
    }

    /// Entries of one folder in file-name order, without thumbnails
    pub fn entries_in_folder(&self, folder: FolderId) -> impl Iterator<Item = &CatalogEntry> {
        self.index.entries_in(folder)
    }

    /// Entries of one folder with their thumbnail payloads attached
    pub fn entries_with_thumbnails(
        &self,
        folder: FolderId,
    ) -> Result<Vec<CatalogEntry>, RepositoryError> {
        if self.index.folder(folder).is_none() {
            return Err(RepositoryError::UnknownFolder(folder));
        }

        let mut page = self.blobs.read_page(folder, self.index.page(folder))?.thumbnails;
        Ok(self
            .index
            .entries_in(folder)
            .map(|entry| CatalogEntry {
                thumbnail: page.remove(&entry.file_name),
                ..entry.clone()
            })
            .collect())
    }

    /// Thumbnail bytes of a single entry
    pub fn thumbnail(
        &self,
        folder: FolderId,
        file_name: &str,
    ) -> Result<Option<Vec<u8>>, RepositoryError> {
        if self.index.entry(folder, file_name).is_none() {
            return Ok(None);
        }
        Ok(self
            .blobs
            .read_page(folder, self.index.page(folder))?
            .thumbnails
            .remove(file_name))
    }

    /// Every entry in catalog order: folder path, then file name
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.index.entries()
    }

    pub fn entry_count(&self) -> usize {
        self.index.entry_count()
    }

    /// Entries built while `kind` was disabled, whose slot is not meaningful
    pub fn missing_fingerprints(&self, kind: FingerprintKind) -> usize {
        self.index
            .entries()
            .filter(|entry| !entry.fingerprints.computed.contains(kind))
            .count()
    }

    /// Fail unless every entry holds a computed fingerprint of `kind`
    pub fn require_fingerprints(&self, kind: FingerprintKind) -> Result<(), RepositoryError> {
        match self.missing_fingerprints(kind) {
            0 => Ok(()),
            missing => Err(RepositoryError::MissingFingerprints { kind, missing }),
        }
    }

    /// Add an entry, replacing any entry with the same key
    pub fn add_entry(&mut self, entry: CatalogEntry) -> Result<(), RepositoryError> {
        let mut batch = CatalogBatch::new();
        batch.upsert(entry);
        self.commit(batch)
    }

    /// Replace an existing entry
    pub fn update_entry(&mut self, entry: CatalogEntry) -> Result<(), RepositoryError> {
        if self.index.entry(entry.folder_id, &entry.file_name).is_none() {
            return Err(RepositoryError::UnknownEntry {
                folder: entry.folder_id,
                file_name: entry.file_name,
            });
        }
        self.add_entry(entry)
    }

    pub fn remove_entry(&mut self, folder: FolderId, file_name: &str) -> Result<(), RepositoryError> {
        let mut batch = CatalogBatch::new();
        batch.remove(folder, file_name);
        self.commit(batch)
    }

    /// Apply a batch atomically
    ///
    /// Every folder the batch touches must be known or added earlier in the
    /// same batch. Upserts without a thumbnail drop any stored thumbnail for
    /// that entry.
    pub fn commit(&mut self, batch: CatalogBatch) -> Result<(), RepositoryError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.validate(&batch)?;

        let mut frames: BTreeMap<FolderId, Vec<PageOp>> = BTreeMap::new();
        for op in batch.ops() {
            let Some(page_op) = op.page_op() else {
                continue;
            };
            // Nothing to remove or rename in a page that holds nothing
            let folder = op.folder_id();
            let holds_nothing = self.index.page(folder).is_empty() && !frames.contains_key(&folder);
            if holds_nothing && !matches!(page_op, PageOp::Insert { .. }) {
                continue;
            }
            frames.entry(folder).or_default().push(page_op);
        }

        let mut appended: Vec<(FolderId, PageRef, PageRef)> = Vec::with_capacity(frames.len());
        for (folder, ops) in &frames {
            let committed = self.index.page(*folder);
            match self.blobs.append(*folder, committed, ops) {
                Ok(page) => appended.push((*folder, committed, page)),
                Err(error) => {
                    self.discard_appended(&appended);
                    return Err(error);
                }
            }
        }

        let pages: Vec<(FolderId, PageRef)> = appended
            .iter()
            .map(|(folder, _, page)| (*folder, *page))
            .collect();
        if let Err(error) = self.records.write_batch(batch.ops(), &pages) {
            self.discard_appended(&appended);
            return Err(error);
        }

        self.index.apply(batch.ops());
        for (folder, page) in pages {
            self.index.set_page(folder, page);
        }
        debug!("Committed batch of {} operations", batch.len());
        Ok(())
    }

    fn validate(&self, batch: &CatalogBatch) -> Result<(), RepositoryError> {
        let mut added: HashSet<FolderId> = HashSet::new();
        for op in batch.ops() {
            match op {
                BatchOp::AddFolder(folder) => {
                    if self.index.folder_by_path(&folder.path).is_some()
                        || self.index.folder(folder.id).is_some()
                        || !added.insert(folder.id)
                    {
                        return Err(RepositoryError::FolderExists {
                            path: folder.path.clone(),
                        });
                    }
                }
                BatchOp::Rename {
                    folder_id, from, ..
                } if self.index.entry(*folder_id, from).is_none() => {
                    return Err(RepositoryError::UnknownEntry {
                        folder: *folder_id,
                        file_name: from.clone(),
                    });
                }
                _ => {
                    let folder = op.folder_id();
                    if self.index.folder(folder).is_none() && !added.contains(&folder) {
                        return Err(RepositoryError::UnknownFolder(folder));
                    }
                }
            }
        }
        Ok(())
    }

    /// Cut appended frames back off after a failed commit
    fn discard_appended(&self, appended: &[(FolderId, PageRef, PageRef)]) {
        for (folder, committed, _) in appended {
            // A tail left behind is ignored by reads and truncated by the next append
            if let Err(e) = self.blobs.discard_tail(*folder, *committed) {
                warn!("Could not roll back thumbnail page of {}: {}", folder, e);
            }
        }
    }

    /// Rewrite a folder's thumbnail page once dead records outnumber live
    /// thumbnails. Returns whether the page was rewritten.
    pub fn compact_thumbnails(&mut self, folder: FolderId) -> Result<bool, RepositoryError> {
        if self.index.folder(folder).is_none() {
            return Err(RepositoryError::UnknownFolder(folder));
        }

        let current = self.index.page(folder);
        if current.is_empty() {
            return Ok(false);
        }
        let contents = self.blobs.read_page(folder, current)?;
        if !contents.needs_compaction() {
            return Ok(false);
        }

        let (live, records) = (contents.thumbnails.len(), contents.records);
        let next = self.blobs.rewrite(folder, current, contents.thumbnails)?;
        if let Err(error) = self.records.set_page(folder, next) {
            if let Err(e) = self.blobs.delete(folder, next) {
                warn!("Could not remove unused thumbnail page of {}: {}", folder, e);
            }
            return Err(error);
        }
        self.index.set_page(folder, next);

        if let Err(e) = self.blobs.delete(folder, current) {
            warn!("Could not delete old thumbnail page of {}: {}", folder, e);
        }
        debug!(
            "Compacted thumbnails of {}: {} live of {} records",
            folder, live, records
        );
        Ok(true)
    }

    // ---- Sync rules ----

    pub fn sync_rules(&self) -> &[SyncRule] {
        self.index.sync_rules()
    }

    /// Replace the stored sync rules
    pub fn set_sync_rules(&mut self, rules: Vec<SyncRule>) -> Result<(), RepositoryError> {
        self.records.replace_sync_rules(&rules)?;
        self.index.set_sync_rules(rules);
        Ok(())
    }

    // ---- Maintenance ----

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            folders: self.index.folder_count(),
            ..CatalogStats::default()
        };
        for entry in self.index.entries() {
            stats.entries += 1;
            stats.total_bytes += entry.file_size;
            if entry.corrupted.set {
                stats.corrupted += 1;
            }
            if entry.rotated.set {
                stats.rotated += 1;
            }
        }
        stats
    }

    /// Snapshot the record store
    pub fn backup(&self) -> Result<PathBuf, RepositoryError> {
        self.backups.snapshot(&self.records)
    }

    /// Snapshots on disk, oldest first
    pub fn backups(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        self.backups.list()
    }

    /// Flush the write-ahead log and close
    pub fn close(self) -> Result<(), RepositoryError> {
        self.records.checkpoint()
    }
}
