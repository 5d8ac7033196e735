//! Catalog snapshots and crash recovery.

use super::records::RecordStore;
use crate::error::RepositoryError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BACKUP_PREFIX: &str = "catalog-";
const BACKUP_SUFFIX: &str = ".db";

pub struct BackupStore {
    dir: PathBuf,
    keep: usize,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    /// Existing snapshots, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RepositoryError::BackupFailed(e.to_string())),
        };

        let mut backups: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        // Names embed a fixed-width UTC timestamp, so name order is age order
        backups.sort();
        Ok(backups)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>, RepositoryError> {
        Ok(self.list()?.pop())
    }

    /// Snapshot the record store, then prune old snapshots
    pub fn snapshot(&self, records: &RecordStore) -> Result<PathBuf, RepositoryError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| RepositoryError::BackupFailed(e.to_string()))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6fZ").to_string();
        let mut target = self.dir.join(format!("{}{}{}", BACKUP_PREFIX, stamp, BACKUP_SUFFIX));
        let mut attempt = 1;
        while target.exists() {
            target = self.dir.join(format!(
                "{}{}_{:03}{}",
                BACKUP_PREFIX, stamp, attempt, BACKUP_SUFFIX
            ));
            attempt += 1;
        }

        records.snapshot_to(&target)?;
        info!("Catalog backed up to {}", target.display());

        self.prune()?;
        Ok(target)
    }

    fn prune(&self) -> Result<(), RepositoryError> {
        let backups = self.list()?;
        let excess = backups.len().saturating_sub(self.keep);
        for old in &backups[..excess] {
            debug!("Removing old backup {}", old.display());
            std::fs::remove_file(old).map_err(|e| RepositoryError::BackupFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Replace the database at `target` with the newest snapshot
    pub fn restore_latest(&self, target: &Path) -> Result<PathBuf, RepositoryError> {
        let backup = self.latest()?.ok_or(RepositoryError::NoBackupAvailable)?;

        for stale in [
            target.to_path_buf(),
            sidecar(target, "-wal"),
            sidecar(target, "-shm"),
        ] {
            match std::fs::remove_file(&stale) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RepositoryError::BackupFailed(e.to_string())),
            }
        }

        std::fs::copy(&backup, target).map_err(|e| RepositoryError::BackupFailed(e.to_string()))?;
        info!("Catalog restored from {}", backup.display());
        Ok(backup)
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
