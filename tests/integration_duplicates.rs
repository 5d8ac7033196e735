//! Integration tests for duplicate detection over synchronized catalogs.
//!
//! These tests verify:
//! - Rotated, copied and renamed photos land in one difference-hash set
//! - Byte-identical copies group under the exact fingerprint
//! - Removing a file and resynchronizing shrinks the set
//! - Grouping is deterministic across independent catalogs
//! - A kind enabled after the first sync is filled in by the next one

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, Rgb};
use media_catalog::config::CatalogConfig;
use media_catalog::core::duplicates::{DuplicateGrouper, DuplicateSet};
use media_catalog::core::fingerprint::FingerprintKind;
use media_catalog::core::model::{Rotation, SENTINEL_FINGERPRINT};
use media_catalog::core::repository::Repository;
use media_catalog::core::storage::LocalStorage;
use media_catalog::core::sync::CatalogSynchronizer;
use media_catalog::error::RepositoryError;
use media_catalog::events::{null_sender, SyncSummary};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STRIPE_LEVELS: [u8; 9] = [40, 200, 60, 220, 30, 190, 50, 240, 70];

/// 144x64 gray image of nine 16 px vertical stripes
fn stripes(levels: [u8; 9]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(144, 64, |x, _| {
        let level = levels[(x / 16) as usize];
        Rgb([level, level, level])
    }))
}

fn encode_jpeg(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, 95))
        .unwrap();
    bytes
}

/// Insert an APP1 segment carrying only an orientation tag right after SOI
fn with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
    app1.extend_from_slice(&1u16.to_be_bytes());
    app1.extend_from_slice(&0x0112u16.to_be_bytes());
    app1.extend_from_slice(&3u16.to_be_bytes());
    app1.extend_from_slice(&1u32.to_be_bytes());
    app1.extend_from_slice(&orientation.to_be_bytes());
    app1.extend_from_slice(&[0, 0]);
    app1.extend_from_slice(&0u32.to_be_bytes());

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Encoded variants of one photo: upright plus stored-rotated copies tagged
/// so that a viewer turns them back upright
struct Variants {
    upright: Vec<u8>,
    rot90: Vec<u8>,
    rot180: Vec<u8>,
    rot270: Vec<u8>,
}

impl Variants {
    fn of(image: &DynamicImage) -> Self {
        Self {
            upright: encode_jpeg(image),
            rot90: with_orientation(&encode_jpeg(&image.rotate270()), 6),
            rot180: with_orientation(&encode_jpeg(&image.rotate180()), 3),
            rot270: with_orientation(&encode_jpeg(&image.rotate90()), 8),
        }
    }
}

fn write(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Fifteen versions of one photo across three folders, plus one unrelated photo
fn build_library(root: &Path) {
    let photo = Variants::of(&stripes(STRIPE_LEVELS));
    let mut unrelated = [0u8; 9];
    for (i, level) in unrelated.iter_mut().enumerate() {
        *level = if i % 2 == 0 { 210 } else { 35 };
    }

    for year in ["2021", "2022"] {
        write(root, &format!("{year}/a_original.jpg"), &photo.upright);
        write(root, &format!("{year}/b_copy.jpg"), &photo.upright);
        write(root, &format!("{year}/c_rot90.jpg"), &photo.rot90);
        write(root, &format!("{year}/d_rot180.jpg"), &photo.rot180);
        write(root, &format!("{year}/e_rot270.jpg"), &photo.rot270);
    }
    write(root, "phone/IMG_0001.JPG", &photo.upright);
    write(root, "phone/IMG_0002.JPG", &photo.rot90);
    write(root, "phone/img_0003.jpg", &photo.rot180);
    write(root, "phone/IMG_0004.jpg", &photo.rot270);
    write(root, "phone/IMG_0005.JPG", &photo.upright);

    write(root, "2021/unrelated.jpg", &encode_jpeg(&stripes(unrelated)));
}

struct Library {
    _media: TempDir,
    data: TempDir,
    root: PathBuf,
}

impl Library {
    fn new() -> Self {
        let media = TempDir::new().unwrap();
        let root = fs::canonicalize(media.path()).unwrap();
        build_library(&root);
        Self {
            _media: media,
            data: TempDir::new().unwrap(),
            root,
        }
    }

    fn config(&self) -> CatalogConfig {
        let mut config = CatalogConfig::new(&self.root);
        config.batch_size = 4;
        config.fingerprint.exact = true;
        config
    }

    fn sync(&self) -> Repository {
        let storage = LocalStorage::new(self.data.path());
        let mut repository = Repository::open(&Repository::catalog_directory(&storage)).unwrap();
        self.resync(&mut repository);
        repository
    }

    fn resync(&self, repository: &mut Repository) -> SyncSummary {
        self.resync_with(repository, self.config())
    }

    fn resync_with(&self, repository: &mut Repository, config: CatalogConfig) -> SyncSummary {
        let storage = LocalStorage::new(self.data.path());
        CatalogSynchronizer::new(config, &storage)
            .run(repository, &null_sender())
            .unwrap()
    }
}

/// Members as paths relative to the library root
fn members(repository: &Repository, root: &Path, set: &DuplicateSet) -> Vec<String> {
    set.entries
        .iter()
        .map(|entry| {
            let folder = repository.folder(entry.folder_id).unwrap().path_buf();
            let relative = folder.strip_prefix(root).unwrap().join(&entry.file_name);
            relative.to_string_lossy().into_owned()
        })
        .collect()
}

#[test]
fn rotated_and_copied_photos_form_one_set() {
    let library = Library::new();
    let repository = library.sync();
    assert_eq!(repository.entry_count(), 16);

    let sets = DuplicateGrouper::new(FingerprintKind::Difference).find_duplicates(&repository);

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 15);
    assert_ne!(sets[0].fingerprint, SENTINEL_FINGERPRINT);

    let paths = members(&repository, &library.root, &sets[0]);
    assert_eq!(paths[0], "2021/a_original.jpg");
    assert_eq!(paths[14], "phone/img_0003.jpg");
    assert!(!paths.iter().any(|p| p.ends_with("unrelated.jpg")));

    let rotated = sets[0].entries.iter().filter(|e| e.rotated.set).count();
    assert_eq!(rotated, 9);
    let turned = sets[0]
        .entries
        .iter()
        .find(|e| e.file_name == "c_rot90.jpg")
        .unwrap();
    assert_eq!(turned.rotation, Rotation::Deg90);
    // Stored pixels are portrait; the upright photo is landscape
    assert_eq!((turned.pixels.width, turned.pixels.height), (64, 144));
}

#[test]
fn exact_fingerprint_groups_byte_identical_files_only() {
    let library = Library::new();
    let repository = library.sync();

    let sets = DuplicateGrouper::new(FingerprintKind::Exact).find_duplicates(&repository);
    let sizes: Vec<usize> = sets.iter().map(DuplicateSet::len).collect();

    // upright copies, then each stored rotation
    assert_eq!(sizes, vec![6, 3, 3, 3]);
    assert_eq!(
        members(&repository, &library.root, &sets[0]),
        vec![
            "2021/a_original.jpg",
            "2021/b_copy.jpg",
            "2022/a_original.jpg",
            "2022/b_copy.jpg",
            "phone/IMG_0001.JPG",
            "phone/IMG_0005.JPG",
        ]
    );
}

#[test]
fn removing_a_file_shrinks_the_set_after_resync() {
    let library = Library::new();
    let mut repository = library.sync();
    let grouper = DuplicateGrouper::new(FingerprintKind::Difference);
    assert_eq!(grouper.find_duplicates(&repository)[0].len(), 15);

    fs::remove_file(library.root.join("2022/d_rot180.jpg")).unwrap();
    library.resync(&mut repository);

    let sets = grouper.find_duplicates(&repository);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 14);
    assert!(!members(&repository, &library.root, &sets[0])
        .contains(&"2022/d_rot180.jpg".to_string()));
}

#[test]
fn grouping_is_deterministic_across_catalogs() {
    let first = Library::new();
    let second = Library::new();
    let a = first.sync();
    let b = second.sync();

    let grouper = DuplicateGrouper::new(FingerprintKind::Difference);
    let sets_a = grouper.find_duplicates(&a);
    let sets_b = grouper.find_duplicates(&b);

    assert_eq!(sets_a.len(), sets_b.len());
    for (x, y) in sets_a.iter().zip(&sets_b) {
        assert_eq!(x.fingerprint, y.fingerprint);
        assert_eq!(members(&a, &first.root, x), members(&b, &second.root, y));
    }
}

#[test]
fn grouping_by_a_kind_enabled_later_needs_a_resync() {
    let library = Library::new();
    let mut repository = library.sync();

    assert!(matches!(
        repository.require_fingerprints(FingerprintKind::Perceptual),
        Err(RepositoryError::MissingFingerprints { missing: 16, .. })
    ));
    assert!(repository.require_fingerprints(FingerprintKind::Difference).is_ok());

    let mut config = library.config();
    config.fingerprint.perceptual = true;
    let summary = library.resync_with(&mut repository, config);
    assert_eq!(summary.updated, 16);
    assert!(repository.require_fingerprints(FingerprintKind::Perceptual).is_ok());

    let sets = DuplicateGrouper::new(FingerprintKind::Perceptual).find_duplicates(&repository);
    let photo = sets
        .iter()
        .find(|set| {
            members(&repository, &library.root, set).contains(&"2021/a_original.jpg".to_string())
        })
        .unwrap();
    assert_ne!(photo.fingerprint, SENTINEL_FINGERPRINT);
    let paths = members(&repository, &library.root, photo);
    for rotated in ["2022/c_rot90.jpg", "2022/d_rot180.jpg", "2022/e_rot270.jpg", "phone/img_0003.jpg"] {
        assert!(paths.contains(&rotated.to_string()), "{} missing", rotated);
    }
}

#[test]
fn undecodable_files_share_the_sentinel_set() {
    let media = TempDir::new().unwrap();
    let root = fs::canonicalize(media.path()).unwrap();
    write(&root, "broken_1.jpg", b"not really a jpeg");
    write(&root, "broken_2.jpg", b"also not a jpeg");
    write(&root, "fine.jpg", &encode_jpeg(&stripes(STRIPE_LEVELS)));

    let data = TempDir::new().unwrap();
    let storage = LocalStorage::new(data.path());
    let mut repository = Repository::open(&Repository::catalog_directory(&storage)).unwrap();
    let mut config = CatalogConfig::new(&root);
    config.fingerprint.exact = true;
    let summary = CatalogSynchronizer::new(config, &storage)
        .run(&mut repository, &null_sender())
        .unwrap();
    assert_eq!(summary.corrupted, 2);

    let sets = DuplicateGrouper::new(FingerprintKind::Difference).find_duplicates(&repository);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].fingerprint, SENTINEL_FINGERPRINT);
    assert!(sets[0].entries.iter().all(|e| e.corrupted.set));

    // The exact fingerprint still tells them apart
    assert!(DuplicateGrouper::new(FingerprintKind::Exact)
        .find_duplicates(&repository)
        .is_empty());
}
