//! In-memory catalog index.
//!
//! Folders are ordered by normalized path and entries within a folder by file
//! name, so iteration is always in catalog order regardless of the order in
//! which records were inserted or loaded.

use super::blobs::PageRef;
use super::{BatchOp, SyncRule};
use crate::core::model::{CatalogEntry, Folder, FolderId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogIndex {
    /// Folders keyed by normalized path
    folders: BTreeMap<String, Folder>,
    paths: HashMap<FolderId, String>,
    entries: HashMap<FolderId, BTreeMap<String, CatalogEntry>>,
    /// Committed thumbnail page extent per folder
    pages: HashMap<FolderId, PageRef>,
    sync_rules: Vec<SyncRule>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_folder(&mut self, folder: Folder) {
        self.paths.insert(folder.id, folder.path.clone());
        self.entries.entry(folder.id).or_default();
        self.folders.insert(folder.path.clone(), folder);
    }

    pub fn remove_folder(&mut self, id: FolderId) -> Option<Folder> {
        let path = self.paths.remove(&id)?;
        self.entries.remove(&id);
        self.pages.remove(&id);
        self.folders.remove(&path)
    }

    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.paths.get(&id).and_then(|path| self.folders.get(path))
    }

    pub fn folder_by_path(&self, normalized: &str) -> Option<&Folder> {
        self.folders.get(normalized)
    }

    /// Folders in path order
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn entry(&self, folder: FolderId, file_name: &str) -> Option<&CatalogEntry> {
        self.entries.get(&folder)?.get(file_name)
    }

    /// Entries of one folder in file-name order
    pub fn entries_in(&self, folder: FolderId) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.get(&folder).into_iter().flat_map(|e| e.values())
    }

    pub fn entry_count_in(&self, folder: FolderId) -> usize {
        self.entries.get(&folder).map_or(0, |e| e.len())
    }

    /// Every entry in catalog order
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.folders.values().flat_map(move |folder| self.entries_in(folder.id))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|e| e.len()).sum()
    }

    /// Insert or replace an entry; its folder must already be indexed.
    /// The thumbnail payload is not kept in the index.
    pub fn upsert(&mut self, entry: &CatalogEntry) {
        if let Some(entries) = self.entries.get_mut(&entry.folder_id) {
            entries.insert(entry.file_name.clone(), entry.without_thumbnail());
        }
    }

    pub fn remove(&mut self, folder: FolderId, file_name: &str) -> Option<CatalogEntry> {
        self.entries.get_mut(&folder)?.remove(file_name)
    }

    /// Re-key an entry under a new file name
    pub fn rename(&mut self, folder: FolderId, from: &str, to: &str) {
        let Some(entries) = self.entries.get_mut(&folder) else {
            return;
        };
        if let Some(mut entry) = entries.remove(from) {
            entry.file_name = to.to_string();
            entries.insert(to.to_string(), entry);
        }
    }

    /// Apply already-persisted batch operations
    pub fn apply(&mut self, ops: &[BatchOp]) {
        for op in ops {
            match op {
                BatchOp::AddFolder(folder) => self.insert_folder(folder.clone()),
                BatchOp::Upsert(entry) => self.upsert(entry),
                BatchOp::Remove { folder_id, file_name } => {
                    self.remove(*folder_id, file_name);
                }
                BatchOp::Rename {
                    folder_id,
                    from,
                    to,
                } => self.rename(*folder_id, from, to),
            }
        }
    }

    /// Committed page extent; empty for folders without thumbnails
    pub fn page(&self, folder: FolderId) -> PageRef {
        self.pages.get(&folder).copied().unwrap_or_default()
    }

    pub fn set_page(&mut self, folder: FolderId, page: PageRef) {
        self.pages.insert(folder, page);
    }

    pub fn pages(&self) -> &HashMap<FolderId, PageRef> {
        &self.pages
    }

    pub fn sync_rules(&self) -> &[SyncRule] {
        &self.sync_rules
    }

    pub fn set_sync_rules(&mut self, rules: Vec<SyncRule>) {
        self.sync_rules = rules;
    }
}
