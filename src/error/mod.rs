//! # Error Module
//!
//! Error types for the media catalog.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Local failures stay local** - a broken file marks one entry, it never aborts a run
//! - **Recovery hints** - suggest how to fix when possible

use crate::core::fingerprint::FingerprintKind;
use crate::core::model::FolderId;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level catalog error
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Synchronization error: {0}")]
    Sync(#[from] SyncError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the storage access layer (reading and decoding media)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },

    #[error("Unsupported media format: {path}")]
    UnsupportedMedia { path: PathBuf },

    #[error("No frame extractor configured for video {path}")]
    FrameExtractionUnavailable { path: PathBuf },

    #[error("Resize failed: {0}")]
    ResizeFailed(String),

    #[error("Thumbnail generation failed: {0}")]
    ThumbnailFailed(String),
}

impl StorageError {
    /// Classify an I/O error for a path
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied { path },
            _ => StorageError::Io { path, source },
        }
    }

    /// Whether this error means the file itself could not be read
    /// (as opposed to being read but not decoded)
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::Io { .. }
        )
    }
}

/// Errors that occur while computing fingerprints
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Fingerprint computation failed: {0}")]
    ComputationFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors that occur while walking the media tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the catalog repository and its stores
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to open catalog at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Catalog query failed: {0}")]
    QueryFailed(String),

    #[error("Catalog corruption detected at {path}. Restore a backup or delete this file and resynchronize.")]
    Corrupted { path: PathBuf },

    #[error("Failed to write thumbnail page {path}: {reason}")]
    BlobWrite { path: PathBuf, reason: String },

    #[error("Failed to read thumbnail page {path}: {reason}")]
    BlobRead { path: PathBuf, reason: String },

    #[error("Folder {path} still holds {entries} catalog entries")]
    FolderInUse { path: String, entries: usize },

    #[error("Unknown folder id {0}")]
    UnknownFolder(FolderId),

    #[error("Folder {path} is already cataloged")]
    FolderExists { path: String },

    #[error("{missing} catalog entries have no {kind} fingerprint. Enable it and synchronize again.")]
    MissingFingerprints { kind: FingerprintKind, missing: usize },

    #[error("No catalog entry {file_name} in folder {folder}")]
    UnknownEntry { folder: FolderId, file_name: String },

    #[error("Failed to serialize catalog data: {0}")]
    SerializationFailed(String),

    #[error("Catalog backup failed: {0}")]
    BackupFailed(String),

    #[error("No catalog backup is available to restore from")]
    NoBackupAvailable,
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(error: rusqlite::Error) -> Self {
        RepositoryError::QueryFailed(error.to_string())
    }
}

/// Run-level synchronization failures
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Commit failed in {folder} after {committed_batches} committed batches: {source}")]
    CommitFailed {
        folder: PathBuf,
        committed_batches: usize,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Errors in loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, CatalogError>;
