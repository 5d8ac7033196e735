//! Integration tests for catalog synchronization.
//!
//! These tests verify end-to-end behavior over real directory trees:
//! - Persistence across reopen
//! - Idempotent resynchronization
//! - Moves, case-only renames and deletions
//! - Recovery from a damaged catalog database

use assert_fs::prelude::*;
use image::{DynamicImage, ImageBuffer, Rgb};
use media_catalog::config::CatalogConfig;
use media_catalog::core::model::CatalogEntry;
use media_catalog::core::repository::Repository;
use media_catalog::core::storage::LocalStorage;
use media_catalog::core::sync::CatalogSynchronizer;
use media_catalog::events::{null_sender, SyncSummary};
use predicates::prelude::*;
use std::path::{Path, PathBuf};

/// A small image whose content depends on `seed`
fn sample_png(seed: u8) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 48, |x, y| {
        Rgb([
            (x as u8).wrapping_mul(seed),
            (y as u8).wrapping_add(seed),
            seed,
        ])
    }));
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

struct Setup {
    media: assert_fs::TempDir,
    data: assert_fs::TempDir,
    root: PathBuf,
}

impl Setup {
    fn new() -> Self {
        let media = assert_fs::TempDir::new().unwrap();
        let data = assert_fs::TempDir::new().unwrap();
        let root = std::fs::canonicalize(media.path()).unwrap();
        Self { media, data, root }
    }

    fn write(&self, relative: &str, seed: u8) {
        let child = self.media.child(relative);
        if let Some(parent) = Path::new(relative).parent() {
            self.media.child(parent).create_dir_all().unwrap();
        }
        child.write_binary(&sample_png(seed)).unwrap();
    }

    fn storage(&self) -> LocalStorage {
        LocalStorage::new(self.data.path())
    }

    fn catalog_dir(&self) -> PathBuf {
        Repository::catalog_directory(&self.storage())
    }

    fn open(&self) -> Repository {
        Repository::open(&self.catalog_dir()).unwrap()
    }

    fn sync(&self, repository: &mut Repository) -> SyncSummary {
        let storage = self.storage();
        let config = CatalogConfig {
            batch_size: 3,
            ..CatalogConfig::new(&self.root)
        };
        CatalogSynchronizer::new(config, &storage)
            .run(repository, &null_sender())
            .unwrap()
    }
}

fn snapshot(repository: &Repository) -> Vec<(String, CatalogEntry)> {
    repository
        .entries()
        .map(|entry| {
            let folder = repository.folder(entry.folder_id).unwrap().path.clone();
            (folder, entry.clone())
        })
        .collect()
}

#[test]
fn catalog_survives_close_and_reopen() {
    let setup = Setup::new();
    for (i, name) in ["2021/a.png", "2021/b.png", "2022/c.png", "2022/d.png", "e.png"]
        .iter()
        .enumerate()
    {
        setup.write(name, i as u8 + 1);
    }

    let mut repository = setup.open();
    let summary = setup.sync(&mut repository);
    assert_eq!(summary.added, 5);
    let before = snapshot(&repository);
    repository.close().unwrap();

    let catalog = assert_fs::fixture::ChildPath::new(setup.catalog_dir());
    catalog.child("catalog.db").assert(predicate::path::is_file());
    catalog.child("thumbnails").assert(predicate::path::is_dir());
    catalog.child("backups").assert(predicate::path::is_dir());

    let reopened = setup.open();
    assert_eq!(snapshot(&reopened), before);

    // Catalog order: folder path, then file name
    let names: Vec<&str> = before.iter().map(|(_, e)| e.file_name.as_str()).collect();
    assert_eq!(names, vec!["e.png", "a.png", "b.png", "c.png", "d.png"]);

    let folder = reopened.folder_by_path(&setup.root.join("2021")).unwrap();
    let with_thumbnails = reopened.entries_with_thumbnails(folder.id).unwrap();
    assert!(with_thumbnails.iter().all(|e| e.thumbnail.is_some()));
}

#[test]
fn second_sync_over_unchanged_tree_is_a_no_op() {
    let setup = Setup::new();
    setup.write("a.png", 1);
    setup.write("nested/deeper/b.png", 2);

    let mut repository = setup.open();
    setup.sync(&mut repository);
    let before = snapshot(&repository);

    let summary = setup.sync(&mut repository);

    assert!(!summary.has_changes());
    assert_eq!(summary.unchanged, 2);
    assert_eq!(snapshot(&repository), before);
}

#[test]
fn moving_a_file_is_a_deletion_and_an_addition() {
    let setup = Setup::new();
    setup.write("inbox/photo.png", 1);
    setup.media.child("archive").create_dir_all().unwrap();

    let mut repository = setup.open();
    setup.sync(&mut repository);

    std::fs::rename(
        setup.root.join("inbox/photo.png"),
        setup.root.join("archive/photo.png"),
    )
    .unwrap();
    let summary = setup.sync(&mut repository);

    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
    let archive = repository.folder_by_path(&setup.root.join("archive")).unwrap();
    assert!(repository.entry(archive.id, "photo.png").is_some());
    assert!(repository.folder_by_path(&setup.root.join("inbox")).is_none());
}

#[test]
fn case_only_rename_updates_the_stored_name() {
    let setup = Setup::new();
    setup.write("img_0001.png", 1);

    let mut repository = setup.open();
    setup.sync(&mut repository);
    let before = repository.entries().next().unwrap().clone();

    std::fs::rename(setup.root.join("img_0001.png"), setup.root.join("IMG_0001.PNG")).unwrap();
    let summary = setup.sync(&mut repository);

    assert_eq!(summary.renamed, 1);
    assert_eq!(summary.added + summary.updated + summary.removed, 0);
    assert_eq!(repository.entry_count(), 1);
    let after = repository.entries().next().unwrap().clone();
    assert_eq!(after.file_name, "IMG_0001.PNG");
    assert_eq!(after.fingerprints, before.fingerprints);
    assert_eq!(after.thumbnail_created, before.thumbnail_created);

    let folder = repository.folder_by_path(&setup.root).unwrap().id;
    assert!(repository.thumbnail(folder, "IMG_0001.PNG").unwrap().is_some());

    repository.close().unwrap();
    let mut reopened = setup.open();
    assert_eq!(reopened.entries().next().unwrap().file_name, "IMG_0001.PNG");
    assert!(!setup.sync(&mut reopened).has_changes());
}

#[test]
fn damaged_database_is_recovered_from_the_last_run() {
    let setup = Setup::new();
    setup.write("a.png", 1);
    setup.write("b.png", 2);

    let mut repository = setup.open();
    setup.sync(&mut repository);
    let before = snapshot(&repository);
    repository.close().unwrap();

    let database = setup.catalog_dir().join("catalog.db");
    std::fs::write(&database, vec![b'x'; 4096]).unwrap();

    let recovered = setup.open();
    assert_eq!(snapshot(&recovered), before);
}

#[test]
fn missing_root_is_reported() {
    let setup = Setup::new();
    let storage = setup.storage();
    let mut repository = setup.open();

    let result = CatalogSynchronizer::new(CatalogConfig::new(setup.root.join("nope")), &storage)
        .run(&mut repository, &null_sender());

    assert!(result.is_err());
    setup.media.child("nope").assert(predicate::path::missing());
}
