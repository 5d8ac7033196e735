//! # Diff Module
//!
//! Compares a folder's current listing with what the catalog holds for it.
//!
//! Files are matched by name within one folder. An exact name match wins;
//! remaining files are then matched case-insensitively, so a filesystem that
//! reports `IMG_1.JPG` where the catalog stored `img_1.jpg` does not produce a
//! delete and an add. If only the case changed, the stored entry is renamed
//! in place. Nothing is matched across folders: a move shows up as a
//! deletion in one folder and a new file in another.
//!
//! A file whose size and modification time are unchanged is still rebuilt
//! when its entry lacks one of the required fingerprint kinds.

use crate::core::fingerprint::FingerprintKinds;
use crate::core::model::CatalogEntry;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

/// A file as seen on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    /// Modification time at catalog precision
    pub modified: DateTime<Utc>,
}

/// A listed file matched to a stored entry that needs changing
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedFile {
    pub file: ListedFile,
    pub previous: CatalogEntry,
}

impl ModifiedFile {
    /// Whether the file now has a differently-cased name than the stored entry
    pub fn renamed(&self) -> bool {
        self.file.name != self.previous.file_name
    }
}

/// Classification of one folder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub new: Vec<ListedFile>,
    pub unchanged: Vec<ListedFile>,
    pub modified: Vec<ModifiedFile>,
    /// Unchanged files whose name now differs from the stored one in case only
    pub renamed: Vec<ModifiedFile>,
    pub deleted: Vec<CatalogEntry>,
}

impl DiffResult {
    /// Whether applying this result would change the catalog
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty()
            || !self.modified.is_empty()
            || !self.renamed.is_empty()
            || !self.deleted.is_empty()
    }
}

/// Classify `listing` against the entries the catalog holds for the same folder.
///
/// Entries missing any kind in `required` count as modified. Result vectors
/// keep the order of their inputs: listed files in listing order, deleted
/// entries in catalog order.
pub fn classify<'a>(
    listing: &[ListedFile],
    prior: impl IntoIterator<Item = &'a CatalogEntry>,
    required: FingerprintKinds,
) -> DiffResult {
    let prior: Vec<&CatalogEntry> = prior.into_iter().collect();
    let by_name: HashMap<&str, usize> = prior
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.file_name.as_str(), i))
        .collect();

    let mut matches: Vec<Option<usize>> = vec![None; listing.len()];
    let mut claimed: HashSet<usize> = HashSet::new();

    for (slot, file) in matches.iter_mut().zip(listing) {
        if let Some(&i) = by_name.get(file.name.as_str()) {
            *slot = Some(i);
            claimed.insert(i);
        }
    }

    let mut by_folded: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (i, entry) in prior.iter().enumerate() {
        if !claimed.contains(&i) {
            by_folded
                .entry(entry.file_name.to_lowercase())
                .or_default()
                .push_back(i);
        }
    }

    for (slot, file) in matches.iter_mut().zip(listing) {
        if slot.is_some() {
            continue;
        }
        if let Some(i) = by_folded
            .get_mut(&file.name.to_lowercase())
            .and_then(|candidates| candidates.pop_front())
        {
            *slot = Some(i);
            claimed.insert(i);
        }
    }

    let mut result = DiffResult::default();
    for (slot, file) in matches.into_iter().zip(listing) {
        match slot {
            None => result.new.push(file.clone()),
            Some(i) => {
                let entry = prior[i];
                let current = file.size == entry.file_size
                    && file.modified == entry.modified
                    && entry.fingerprints.computed.contains_all(required);
                let matched = ModifiedFile {
                    file: file.clone(),
                    previous: entry.clone(),
                };
                if !current {
                    result.modified.push(matched);
                } else if matched.renamed() {
                    result.renamed.push(matched);
                } else {
                    result.unchanged.push(file.clone());
                }
            }
        }
    }

    result.deleted = prior
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed.contains(i))
        .map(|(_, entry)| (*entry).clone())
        .collect();

    result
}
