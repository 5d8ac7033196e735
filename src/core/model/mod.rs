//! # Model Module
//!
//! The catalog's data model: folders, catalog entries and their fingerprints.
//!
//! Entries refer to their folder by [`FolderId`] only; the folder itself is
//! looked up through the repository.

use crate::core::fingerprint::{FingerprintKind, FingerprintKinds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Fingerprint value meaning "not computed or unavailable".
///
/// It takes part in equality like any other value.
pub const SENTINEL_FINGERPRINT: &str = "0";

/// Opaque folder identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FolderId(Uuid);

impl FolderId {
    /// Allocate a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a stored identity
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory known to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    /// Normalized absolute path, unique per catalog
    pub path: String,
}

impl Folder {
    /// Create a folder record for a path, normalizing it
    pub fn new(path: &Path) -> Self {
        Self {
            id: FolderId::new(),
            path: normalize_folder_path(path),
        }
    }

    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Whether this folder is `root` or lies beneath it
    pub fn is_within(&self, root: &str) -> bool {
        Path::new(&self.path).starts_with(root)
    }
}

/// Normalize a folder path lexically.
///
/// Drops `.` components and trailing separators and resolves `..` without
/// touching the filesystem, so paths of folders that no longer exist still
/// normalize the same way.
pub fn normalize_folder_path(path: &Path) -> String {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}

/// Orientation applied when the thumbnail and fingerprints were computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Clockwise rotation in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether the rotation exchanges width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Parse a stored degree value
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Map an EXIF orientation tag (1-8) to the rotation it implies.
    ///
    /// Mirrored orientations keep their rotation component only.
    pub fn from_exif_orientation(orientation: u32) -> Self {
        match orientation {
            3 | 4 => Rotation::Deg180,
            5 | 6 => Rotation::Deg90,
            7 | 8 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// One fingerprint slot per kind; disabled or failed slots hold the sentinel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    pub exact: String,
    pub difference: String,
    pub perceptual: String,
    /// Kinds that were attempted when the entry was built, failed ones included
    pub computed: FingerprintKinds,
}

impl Fingerprints {
    /// All slots set to the sentinel
    pub fn unset() -> Self {
        Self {
            exact: SENTINEL_FINGERPRINT.to_string(),
            difference: SENTINEL_FINGERPRINT.to_string(),
            perceptual: SENTINEL_FINGERPRINT.to_string(),
            computed: FingerprintKinds::empty(),
        }
    }

    pub fn get(&self, kind: FingerprintKind) -> &str {
        match kind {
            FingerprintKind::Exact => &self.exact,
            FingerprintKind::Difference => &self.difference,
            FingerprintKind::Perceptual => &self.perceptual,
        }
    }

    pub fn set(&mut self, kind: FingerprintKind, value: String) {
        match kind {
            FingerprintKind::Exact => self.exact = value,
            FingerprintKind::Difference => self.difference = value,
            FingerprintKind::Perceptual => self.perceptual = value,
        }
    }
}

impl Default for Fingerprints {
    fn default() -> Self {
        Self::unset()
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A flag with an optional explanation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flag {
    pub set: bool,
    pub message: Option<String>,
}

impl Flag {
    pub fn raised(message: impl Into<String>) -> Self {
        Self {
            set: true,
            message: Some(message.into()),
        }
    }
}

/// The persisted record describing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub folder_id: FolderId,
    pub file_name: String,
    /// Pixel size as stored on disk, before the recorded rotation is applied
    pub pixels: Dimensions,
    pub thumbnail_pixels: Dimensions,
    pub file_size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub thumbnail_created: DateTime<Utc>,
    pub rotation: Rotation,
    pub fingerprints: Fingerprints,
    pub corrupted: Flag,
    pub rotated: Flag,
    /// Thumbnail bytes; only attached for the folder currently being viewed
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
}

impl CatalogEntry {
    /// The fingerprint of the given kind
    pub fn fingerprint(&self, kind: FingerprintKind) -> &str {
        self.fingerprints.get(kind)
    }

    /// Identity key within the catalog
    pub fn key(&self) -> (FolderId, &str) {
        (self.folder_id, &self.file_name)
    }

    /// Copy of this entry without its thumbnail payload
    pub fn without_thumbnail(&self) -> Self {
        Self {
            thumbnail: None,
            ..self.clone()
        }
    }
}

/// Convert a filesystem timestamp into catalog precision.
///
/// Catalog timestamps are kept at microsecond precision so that what is
/// stored, reloaded and compared against a fresh listing is always equal.
pub fn catalog_time(time: SystemTime) -> DateTime<Utc> {
    from_micros(DateTime::<Utc>::from(time).timestamp_micros())
}

/// Current time at catalog precision
pub fn catalog_now() -> DateTime<Utc> {
    catalog_time(SystemTime::now())
}

/// Rebuild a catalog timestamp from microseconds since the Unix epoch
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn normalize_drops_trailing_separator_and_dots() {
        assert_eq!(
            normalize_folder_path(Path::new("/photos/./2023/")),
            "/photos/2023"
        );
        assert_eq!(
            normalize_folder_path(Path::new("/photos/2023/../2024")),
            "/photos/2024"
        );
    }

    #[test]
    fn folder_is_within_root() {
        let folder = Folder::new(Path::new("/photos/2023/summer"));
        assert!(folder.is_within("/photos"));
        assert!(folder.is_within("/photos/2023/summer"));
        assert!(!folder.is_within("/photos/2023/sum"));
        assert!(!folder.is_within("/videos"));
    }

    #[test]
    fn exif_orientation_maps_to_rotation() {
        assert_eq!(Rotation::from_exif_orientation(1), Rotation::Deg0);
        assert_eq!(Rotation::from_exif_orientation(6), Rotation::Deg90);
        assert_eq!(Rotation::from_exif_orientation(3), Rotation::Deg180);
        assert_eq!(Rotation::from_exif_orientation(8), Rotation::Deg270);
        assert_eq!(Rotation::from_exif_orientation(42), Rotation::Deg0);
    }

    #[test]
    fn rotation_degrees_round_trip() {
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            assert_eq!(Rotation::from_degrees(rotation.degrees()), Some(rotation));
        }
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn catalog_time_truncates_to_micros() {
        let time = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let converted = catalog_time(time);
        assert_eq!(converted.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(from_micros(converted.timestamp_micros()), converted);
    }

    #[test]
    fn fingerprints_default_to_sentinel() {
        let fingerprints = Fingerprints::unset();
        assert_eq!(fingerprints.get(FingerprintKind::Exact), SENTINEL_FINGERPRINT);
        assert_eq!(fingerprints.get(FingerprintKind::Difference), SENTINEL_FINGERPRINT);
        assert_eq!(fingerprints.get(FingerprintKind::Perceptual), SENTINEL_FINGERPRINT);
    }
}
