//! # Duplicates Module
//!
//! Groups catalog entries whose fingerprints are equal.
//!
//! ## Ordering
//! Entries are visited in catalog order (folder path, then file name).
//! Sets are emitted in the order their first member was met, and members
//! keep visiting order, so the result depends only on catalog state.
//!
//! Grouping is by string equality of one fingerprint kind. The sentinel
//! `"0"` is an ordinary value: entries without a computed fingerprint form
//! a set of their own.

use crate::core::fingerprint::FingerprintKind;
use crate::core::model::CatalogEntry;
use crate::core::repository::Repository;
use crate::events::{null_sender, DuplicatesEvent, Event, EventSender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Two or more entries sharing one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSet {
    pub fingerprint: String,
    /// Members in catalog order
    pub entries: Vec<CatalogEntry>,
}

impl DuplicateSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Members beyond the first
    pub fn duplicate_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    /// Bytes freed by keeping only the first member
    pub fn reclaimable_bytes(&self) -> u64 {
        self.entries.iter().skip(1).map(|e| e.file_size).sum()
    }
}

/// Finds duplicate sets under one fingerprint kind
pub struct DuplicateGrouper {
    kind: FingerprintKind,
}

impl DuplicateGrouper {
    pub fn new(kind: FingerprintKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> FingerprintKind {
        self.kind
    }

    /// Duplicate sets of the committed catalog
    pub fn find_duplicates(&self, repository: &Repository) -> Vec<DuplicateSet> {
        self.find_duplicates_with_events(repository, &null_sender())
    }

    pub fn find_duplicates_with_events(
        &self,
        repository: &Repository,
        events: &EventSender,
    ) -> Vec<DuplicateSet> {
        events.send(Event::Duplicates(DuplicatesEvent::Started {
            total_entries: repository.entry_count(),
        }));

        let sets = self.group(repository.entries());

        let total_duplicates = sets.iter().map(DuplicateSet::duplicate_count).sum();
        info!(
            "Found {} duplicate sets ({} duplicates) by {}",
            sets.len(),
            total_duplicates,
            self.kind
        );
        events.send(Event::Duplicates(DuplicatesEvent::Completed {
            total_sets: sets.len(),
            total_duplicates,
        }));

        sets
    }

    /// Group entries given in catalog order
    pub fn group<'a>(&self, entries: impl IntoIterator<Item = &'a CatalogEntry>) -> Vec<DuplicateSet> {
        let mut positions: HashMap<&'a str, usize> = HashMap::new();
        let mut groups: Vec<DuplicateSet> = Vec::new();

        for entry in entries {
            let fingerprint = entry.fingerprint(self.kind);
            let position = *positions.entry(fingerprint).or_insert_with(|| {
                groups.push(DuplicateSet {
                    fingerprint: fingerprint.to_string(),
                    entries: Vec::new(),
                });
                groups.len() - 1
            });
            groups[position].entries.push(entry.clone());
        }

        groups.retain(|set| set.len() >= 2);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        catalog_now, Dimensions, Fingerprints, Flag, Folder, FolderId, Rotation,
        SENTINEL_FINGERPRINT,
    };
    use crate::core::repository::CatalogBatch;
    use std::path::Path;
    use tempfile::TempDir;

    fn entry(folder: FolderId, name: &str, difference: &str) -> CatalogEntry {
        let now = catalog_now();
        CatalogEntry {
            folder_id: folder,
            file_name: name.to_string(),
            pixels: Dimensions::new(100, 100),
            thumbnail_pixels: Dimensions::new(100, 100),
            file_size: 1000,
            created: now,
            modified: now,
            thumbnail_created: now,
            rotation: Rotation::Deg0,
            fingerprints: Fingerprints {
                difference: difference.to_string(),
                ..Fingerprints::unset()
            },
            corrupted: Flag::default(),
            rotated: Flag::default(),
            thumbnail: None,
        }
    }

    fn names(set: &DuplicateSet) -> Vec<&str> {
        set.entries.iter().map(|e| e.file_name.as_str()).collect()
    }

    fn grouper() -> DuplicateGrouper {
        DuplicateGrouper::new(FingerprintKind::Difference)
    }

    #[test]
    fn empty_catalog_has_no_duplicates() {
        assert!(grouper().group(&Vec::<CatalogEntry>::new()).is_empty());
    }

    #[test]
    fn unique_fingerprints_have_no_duplicates() {
        let folder = FolderId::new();
        let entries = vec![
            entry(folder, "a.jpg", "1"),
            entry(folder, "b.jpg", "2"),
            entry(folder, "c.jpg", "3"),
        ];
        assert!(grouper().group(&entries).is_empty());
    }

    #[test]
    fn pair_forms_one_set() {
        let folder = FolderId::new();
        let entries = vec![entry(folder, "a.jpg", "42"), entry(folder, "b.jpg", "42")];

        let sets = grouper().group(&entries);

        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[0].fingerprint, "42");
        assert_eq!(sets[0].reclaimable_bytes(), 1000);
    }

    #[test]
    fn sets_follow_first_occurrence_order() {
        let folder = FolderId::new();
        let entries = vec![
            entry(folder, "a.jpg", "7"),
            entry(folder, "b.jpg", "5"),
            entry(folder, "c.jpg", "9"),
            entry(folder, "d.jpg", "5"),
            entry(folder, "e.jpg", "7"),
        ];

        let sets = grouper().group(&entries);

        assert_eq!(sets.len(), 2);
        assert_eq!(names(&sets[0]), vec!["a.jpg", "e.jpg"]);
        assert_eq!(names(&sets[1]), vec!["b.jpg", "d.jpg"]);
    }

    #[test]
    fn sentinel_entries_group_together() {
        let folder = FolderId::new();
        let entries = vec![
            entry(folder, "broken1.jpg", SENTINEL_FINGERPRINT),
            entry(folder, "fine.jpg", "12345"),
            entry(folder, "broken2.jpg", SENTINEL_FINGERPRINT),
        ];

        let sets = grouper().group(&entries);

        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].fingerprint, SENTINEL_FINGERPRINT);
        assert_eq!(names(&sets[0]), vec!["broken1.jpg", "broken2.jpg"]);
    }

    #[test]
    fn groups_by_the_selected_kind_only() {
        let folder = FolderId::new();
        let mut a = entry(folder, "a.jpg", "1");
        let mut b = entry(folder, "b.jpg", "2");
        a.fingerprints.exact = "same".to_string();
        b.fingerprints.exact = "same".to_string();
        let entries = vec![a, b];

        assert!(grouper().group(&entries).is_empty());
        assert_eq!(
            DuplicateGrouper::new(FingerprintKind::Exact)
                .group(&entries)
                .len(),
            1
        );
    }

    #[test]
    fn fifteen_matches_across_folders_form_one_set() {
        const FINGERPRINT: &str = "23831507941108244";
        let temp_dir = TempDir::new().unwrap();
        let mut repository = Repository::open(temp_dir.path()).unwrap();

        let folders: Vec<Folder> = ["/photos/2021", "/photos/2022", "/photos/phone"]
            .iter()
            .map(|p| repository.resolve_folder(Path::new(p)).unwrap())
            .collect();

        let mut batch = CatalogBatch::new();
        for i in 0..15 {
            let folder = &folders[i % 3];
            let name = if i == 14 {
                "IMG_CASE.JPG".to_string()
            } else {
                format!("img_{:02}.jpg", i)
            };
            let mut e = entry(folder.id, &name, FINGERPRINT);
            if i % 5 == 1 {
                e.rotation = Rotation::Deg90;
                e.rotated = Flag::raised("rotated 90°");
            }
            batch.upsert(e);
        }
        batch.upsert(entry(folders[0].id, "unrelated.jpg", "99"));
        repository.commit(batch).unwrap();

        let first = grouper().find_duplicates(&repository);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].len(), 15);
        assert_eq!(grouper().find_duplicates(&repository), first);

        let removed = &first[0].entries[3];
        repository
            .remove_entry(removed.folder_id, &removed.file_name)
            .unwrap();

        let second = grouper().find_duplicates(&repository);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].len(), 14);
        assert!(!second[0]
            .entries
            .iter()
            .any(|e| e.key() == removed.key()));
    }
}
