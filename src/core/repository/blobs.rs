//! Thumbnail blob pages.
//!
//! Each folder's thumbnails live in an append-only page file,
//! `<folder-id>-<generation>.bin`. A commit appends one bincode frame of
//! [`PageOp`]s. The record store saves the committed length of every page in
//! the same transaction as the records, so bytes past that length belong to
//! a commit that never finished: reads ignore them and the next append
//! truncates them away.
//!
//! Compaction writes the live thumbnails into the next generation as a
//! single frame. The old generation is deleted once the record store points
//! at the new one.

use crate::core::model::FolderId;
use crate::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Committed extent of a folder's page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRef {
    pub generation: u64,
    /// Bytes of the page file that belong to committed frames
    pub len: u64,
}

impl PageRef {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One recorded change to a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOp {
    Insert { name: String, bytes: Vec<u8> },
    Remove { name: String },
    Rename { from: String, to: String },
}

/// Live thumbnails of a page
#[derive(Debug, Default)]
pub struct PageContents {
    pub thumbnails: BTreeMap<String, Vec<u8>>,
    /// Operations recorded in the page, live or not
    pub records: usize,
}

impl PageContents {
    /// Whether dead records outnumber live thumbnails
    pub fn needs_compaction(&self) -> bool {
        self.records > 2 * self.thumbnails.len()
    }

    fn apply(&mut self, op: PageOp) {
        self.records += 1;
        match op {
            PageOp::Insert { name, bytes } => {
                self.thumbnails.insert(name, bytes);
            }
            PageOp::Remove { name } => {
                self.thumbnails.remove(&name);
            }
            PageOp::Rename { from, to } => {
                if let Some(bytes) = self.thumbnails.remove(&from) {
                    self.thumbnails.insert(to, bytes);
                }
            }
        }
    }
}

pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn page_path(&self, folder: FolderId, generation: u64) -> PathBuf {
        self.dir.join(format!("{}-{}.bin", folder, generation))
    }

    /// Replay the committed frames of a page
    pub fn read_page(&self, folder: FolderId, page: PageRef) -> Result<PageContents, RepositoryError> {
        let mut contents = PageContents::default();
        if page.is_empty() {
            return Ok(contents);
        }

        let path = self.page_path(folder, page.generation);
        let read_failed = |reason: String| RepositoryError::BlobRead {
            path: path.clone(),
            reason,
        };

        let file = File::open(&path).map_err(|e| read_failed(e.to_string()))?;
        let mut bytes = Vec::new();
        file.take(page.len)
            .read_to_end(&mut bytes)
            .map_err(|e| read_failed(e.to_string()))?;
        if bytes.len() as u64 != page.len {
            return Err(read_failed(format!(
                "page holds {} of {} committed bytes",
                bytes.len(),
                page.len
            )));
        }

        let mut offset = 0;
        while offset < bytes.len() {
            let (frame, used): (Vec<PageOp>, usize) =
                bincode::serde::decode_from_slice(&bytes[offset..], bincode::config::standard())
                    .map_err(|e| read_failed(e.to_string()))?;
            offset += used;
            for op in frame {
                contents.apply(op);
            }
        }
        Ok(contents)
    }

    /// Append one frame after the committed extent of a page.
    ///
    /// Returns the extent to commit; until it is, the frame is invisible.
    pub fn append(
        &self,
        folder: FolderId,
        page: PageRef,
        ops: &[PageOp],
    ) -> Result<PageRef, RepositoryError> {
        let path = self.page_path(folder, page.generation);
        let write_failed = |reason: String| RepositoryError::BlobWrite {
            path: path.clone(),
            reason,
        };

        let encoded = bincode::serde::encode_to_vec(ops, bincode::config::standard())
            .map_err(|e| RepositoryError::SerializationFailed(e.to_string()))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| write_failed(e.to_string()))?;
        // Drop frames of commits that never finished
        file.set_len(page.len)
            .map_err(|e| write_failed(e.to_string()))?;
        file.seek(SeekFrom::Start(page.len))
            .map_err(|e| write_failed(e.to_string()))?;
        file.write_all(&encoded)
            .map_err(|e| write_failed(e.to_string()))?;
        file.sync_data().map_err(|e| write_failed(e.to_string()))?;

        Ok(PageRef {
            generation: page.generation,
            len: page.len + encoded.len() as u64,
        })
    }

    /// Cut a page back to its committed extent after a failed commit
    pub fn discard_tail(&self, folder: FolderId, page: PageRef) -> Result<(), RepositoryError> {
        let path = self.page_path(folder, page.generation);
        if page.is_empty() {
            return remove_if_present(&path);
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| RepositoryError::BlobWrite {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        file.set_len(page.len).map_err(|e| RepositoryError::BlobWrite {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write `thumbnails` as the next generation of a page
    pub fn rewrite(
        &self,
        folder: FolderId,
        page: PageRef,
        thumbnails: BTreeMap<String, Vec<u8>>,
    ) -> Result<PageRef, RepositoryError> {
        let generation = page.generation + 1;
        if thumbnails.is_empty() {
            return Ok(PageRef { generation, len: 0 });
        }

        let ops: Vec<PageOp> = thumbnails
            .into_iter()
            .map(|(name, bytes)| PageOp::Insert { name, bytes })
            .collect();
        let encoded = bincode::serde::encode_to_vec(&ops, bincode::config::standard())
            .map_err(|e| RepositoryError::SerializationFailed(e.to_string()))?;

        self.write_atomically(&self.page_path(folder, generation), &encoded)?;
        Ok(PageRef {
            generation,
            len: encoded.len() as u64,
        })
    }

    /// Remove one generation of a page
    pub fn delete(&self, folder: FolderId, page: PageRef) -> Result<(), RepositoryError> {
        remove_if_present(&self.page_path(folder, page.generation))
    }

    /// Delete page files that no committed extent points at.
    ///
    /// Returns the number of files removed.
    pub fn remove_orphans(&self, live: &HashMap<FolderId, PageRef>) -> Result<usize, RepositoryError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(RepositoryError::BlobRead {
                    path: self.dir.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".bin") else {
                continue;
            };

            let referenced = parse_page_name(stem).is_some_and(|(folder, generation)| {
                live.get(&folder)
                    .is_some_and(|page| page.generation == generation && !page.is_empty())
            });
            if !referenced {
                remove_if_present(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<(), RepositoryError> {
        let write_failed = |reason: String| RepositoryError::BlobWrite {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        let mut file = NamedTempFile::new_in(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        file.write_all(bytes).map_err(|e| write_failed(e.to_string()))?;
        file.as_file()
            .sync_all()
            .map_err(|e| write_failed(e.to_string()))?;
        file.persist(path)
            .map_err(|e| write_failed(e.error.to_string()))?;
        Ok(())
    }
}

/// Split `<folder-id>-<generation>`
fn parse_page_name(stem: &str) -> Option<(FolderId, u64)> {
    let (folder, generation) = stem.rsplit_once('-')?;
    Some((FolderId::parse(folder)?, generation.parse().ok()?))
}

fn remove_if_present(path: &Path) -> Result<(), RepositoryError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepositoryError::BlobWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
