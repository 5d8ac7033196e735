//! # Builder Module
//!
//! Turns a file on disk into a complete [`CatalogEntry`].
//!
//! The builder reads file properties, decodes the file, renders its
//! thumbnail and computes the enabled fingerprints. It returns a finished
//! entry (thumbnail payload attached) and never touches the repository;
//! handing entries over in batches is the synchronizer's job.
//!
//! ## Failure handling
//! - The file cannot be read: the error is returned and the caller skips the path.
//! - The file is read but cannot be decoded: a corrupted entry is returned,
//!   with the exact fingerprint computed and pixel-based slots at the sentinel.

use crate::config::CatalogConfig;
use crate::core::diff::ListedFile;
use crate::core::fingerprint::{
    FingerprintCalculator, FingerprintKind, FingerprintKinds, FingerprintSource,
};
use crate::core::model::{
    catalog_now, catalog_time, CatalogEntry, Dimensions, Flag, FolderId, Rotation,
};
use crate::core::storage::StorageAccess;
use crate::error::StorageError;
use std::path::Path;
use tracing::debug;

/// Builds catalog entries from files
pub struct CatalogEntryBuilder<'a> {
    storage: &'a dyn StorageAccess,
    calculator: FingerprintCalculator,
    thumbnail_max_width: u32,
    thumbnail_max_height: u32,
}

impl<'a> CatalogEntryBuilder<'a> {
    /// Builder using the thumbnail bounds and fingerprint kinds of `config`
    pub fn new(storage: &'a dyn StorageAccess, config: &CatalogConfig) -> Self {
        Self::with_kinds(
            storage,
            &config.fingerprint.enabled_kinds(),
            config.thumbnail_max_width,
            config.thumbnail_max_height,
        )
    }

    pub fn with_kinds(
        storage: &'a dyn StorageAccess,
        kinds: &[FingerprintKind],
        thumbnail_max_width: u32,
        thumbnail_max_height: u32,
    ) -> Self {
        Self {
            storage,
            calculator: FingerprintCalculator::new(kinds),
            thumbnail_max_width,
            thumbnail_max_height,
        }
    }

    /// Kinds every built entry carries
    pub fn fingerprint_kinds(&self) -> FingerprintKinds {
        self.calculator.enabled_kinds()
    }

    /// Describe a file from its filesystem metadata
    pub fn list(path: &Path) -> Result<ListedFile, StorageError> {
        let metadata = std::fs::metadata(path).map_err(|e| StorageError::from_io(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::from_io(path, e))?;
        // Not every filesystem records a creation time
        let created = metadata.created().unwrap_or(modified);

        Ok(ListedFile {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            created: catalog_time(created),
            modified: catalog_time(modified),
        })
    }

    /// Build the entry for a listed file in `folder`
    pub fn build(&self, folder: FolderId, file: &ListedFile) -> Result<CatalogEntry, StorageError> {
        let bytes = self.storage.read_file(&file.path)?;

        let mut entry = CatalogEntry {
            folder_id: folder,
            file_name: file.name.clone(),
            pixels: Dimensions::default(),
            thumbnail_pixels: Dimensions::default(),
            file_size: file.size,
            created: file.created,
            modified: file.modified,
            thumbnail_created: catalog_now(),
            rotation: Rotation::Deg0,
            fingerprints: Default::default(),
            corrupted: Flag::default(),
            rotated: Flag::default(),
            thumbnail: None,
        };

        let decoded = self.storage.decode_and_thumbnail(
            &file.path,
            &bytes,
            self.thumbnail_max_width,
            self.thumbnail_max_height,
        );

        match decoded {
            Ok((media, thumbnail)) => {
                let outcome = self.calculator.compute_enabled(&FingerprintSource {
                    bytes: &bytes,
                    image: Some(&media.image),
                });

                entry.pixels = media.stored_dimensions();
                entry.thumbnail_pixels = thumbnail.dimensions;
                entry.rotation = media.rotation;
                entry.fingerprints = outcome.fingerprints;
                entry.thumbnail = Some(thumbnail.bytes);
                if media.rotation != Rotation::Deg0 {
                    entry.rotated = Flag::raised(format!("rotated {}", media.rotation));
                }
                if let Some(failure) = outcome.failure {
                    entry.corrupted = Flag::raised(failure);
                }
            }
            Err(error) if error.is_filesystem() => return Err(error),
            Err(error) => {
                debug!("Cataloging {} as corrupted: {}", file.path.display(), error);
                let outcome = self.calculator.compute_enabled(&FingerprintSource {
                    bytes: &bytes,
                    image: None,
                });
                entry.fingerprints = outcome.fingerprints;
                entry.corrupted = Flag::raised(error.to_string());
            }
        }

        Ok(entry)
    }
}
