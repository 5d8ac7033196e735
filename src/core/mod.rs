//! # Core Module
//!
//! The GUI-agnostic catalog engine.
//!
//! ## Modules
//! - `model` - Folders, catalog entries and fingerprints
//! - `storage` - Reads, decodes and thumbnails media files
//! - `fingerprint` - Computes duplicate-grouping keys
//! - `builder` - Builds a complete entry for one file
//! - `diff` - Classifies a folder listing against the catalog
//! - `sync` - Brings the catalog in line with a directory tree
//! - `repository` - Durable catalog state and its in-memory index
//! - `duplicates` - Groups entries with equal fingerprints

pub mod builder;
pub mod diff;
pub mod duplicates;
pub mod fingerprint;
pub mod model;
pub mod repository;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use builder::CatalogEntryBuilder;
pub use duplicates::{DuplicateGrouper, DuplicateSet};
pub use fingerprint::{FingerprintCalculator, FingerprintKind};
pub use model::{CatalogEntry, Folder, FolderId, Rotation};
pub use repository::{CatalogBatch, CatalogStats, Repository, SyncRule};
pub use storage::{LocalStorage, StorageAccess};
pub use sync::CatalogSynchronizer;
