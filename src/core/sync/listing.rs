//! Directory listing for synchronization.

use crate::core::builder::CatalogEntryBuilder;
use crate::core::diff::ListedFile;
use crate::core::storage::MediaFormat;
use crate::error::ScanError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Decides which files are cataloged
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaFilter {
    include_hidden: bool,
    include_videos: bool,
}

impl MediaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include hidden files and directories (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn with_videos(mut self, include: bool) -> Self {
        self.include_videos = include;
        self
    }

    /// Check if a file should be cataloged
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden && is_hidden(path) {
            return false;
        }

        let format = MediaFormat::from_path(path);
        format.is_image() || (self.include_videos && format.is_video())
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        entry.depth() == 0 || self.include_hidden || !is_hidden(entry.path())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// A path that could not be read
#[derive(Debug, Clone)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub message: String,
}

/// The cataloged files of one folder, sorted by name
#[derive(Debug, Clone, Default)]
pub struct FolderListing {
    pub files: Vec<ListedFile>,
    pub skipped: Vec<SkippedPath>,
}

/// Every folder under `root`, depth-first with siblings in name order.
///
/// Subdirectories that cannot be read are returned as skipped paths.
pub fn walk_folders(
    root: &Path,
    filter: &MediaFilter,
) -> Result<(Vec<PathBuf>, Vec<SkippedPath>), ScanError> {
    if !root.is_dir() {
        return Err(ScanError::DirectoryNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut folders = Vec::new();
    let mut skipped = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.file_type().is_dir() || filter.should_descend(entry));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => folders.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => return Err(walk_error(root, e)),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                skipped.push(SkippedPath {
                    message: walk_error(&path, e).to_string(),
                    path,
                });
            }
        }
    }

    Ok((folders, skipped))
}

/// List the cataloged files directly inside `folder`
pub fn list_folder(folder: &Path, filter: &MediaFilter) -> Result<FolderListing, ScanError> {
    let mut listing = FolderListing::default();

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.path() == Some(folder) => return Err(walk_error(folder, e)),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                listing.skipped.push(SkippedPath {
                    message: e.to_string(),
                    path,
                });
                continue;
            }
        };

        if !entry.file_type().is_file() || !filter.should_include(entry.path()) {
            continue;
        }

        match CatalogEntryBuilder::list(entry.path()) {
            Ok(file) => listing.files.push(file),
            Err(e) => listing.skipped.push(SkippedPath {
                path: entry.into_path(),
                message: e.to_string(),
            }),
        }
    }

    // walkdir sorts by OS string; catalog order is by name
    listing.files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

fn walk_error(path: &Path, error: walkdir::Error) -> ScanError {
    match error.io_error().map(|e| e.kind()) {
        Some(std::io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        Some(std::io::ErrorKind::NotFound) => ScanError::DirectoryNotFound {
            path: path.to_path_buf(),
        },
        _ => ScanError::ReadDirectory {
            path: path.to_path_buf(),
            source: std::io::Error::other(error.to_string()),
        },
    }
}
