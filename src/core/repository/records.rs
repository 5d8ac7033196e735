//! SQLite record store for folders, catalog entries and sync rules.

use super::blobs::PageRef;
use super::{BatchOp, CatalogIndex, SyncRule};
use crate::core::fingerprint::FingerprintKinds;
use crate::core::model::{
    from_micros, CatalogEntry, Dimensions, Fingerprints, Flag, Folder, FolderId, Rotation,
};
use crate::error::RepositoryError;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Schema version written to `catalog_meta`
const SCHEMA_VERSION: &str = "2";

const ENTRY_COLUMNS: &str = "folder_id, file_name, width, height, thumbnail_width, \
     thumbnail_height, file_size, created, modified, thumbnail_created, rotation, \
     fingerprint_exact, fingerprint_difference, fingerprint_perceptual, fingerprint_kinds, \
     corrupted, corrupted_message, rotated, rotated_message";

/// SQLite-backed record store
///
/// Uses WAL mode; every batch is written in a single transaction together
/// with the committed extents of the thumbnail pages it touched.
pub struct RecordStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl RecordStore {
    /// Open or create the record database at the given path
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepositoryError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let open_failed = |e: rusqlite::Error| RepositoryError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let conn = Connection::open(path).map_err(open_failed)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             CREATE TABLE IF NOT EXISTS catalog_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS folders (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                thumbnail_generation INTEGER NOT NULL DEFAULT 0,
                thumbnail_length INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS assets (
                folder_id TEXT NOT NULL REFERENCES folders(id),
                file_name TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                thumbnail_width INTEGER NOT NULL,
                thumbnail_height INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                created INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                thumbnail_created INTEGER NOT NULL,
                rotation INTEGER NOT NULL,
                fingerprint_exact TEXT NOT NULL,
                fingerprint_difference TEXT NOT NULL,
                fingerprint_perceptual TEXT NOT NULL,
                fingerprint_kinds INTEGER NOT NULL,
                corrupted INTEGER NOT NULL,
                corrupted_message TEXT,
                rotated INTEGER NOT NULL,
                rotated_message TEXT,
                PRIMARY KEY (folder_id, file_name)
             );
             CREATE TABLE IF NOT EXISTS sync_rules (
                position INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                destination TEXT NOT NULL,
                include_subfolders INTEGER NOT NULL,
                delete_not_in_source INTEGER NOT NULL
             );",
        )
        .map_err(open_failed)?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM catalog_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(open_failed)?;

        match version.as_deref() {
            None => {
                conn.execute(
                    "INSERT INTO catalog_meta (key, value) VALUES ('schema_version', ?1)",
                    [SCHEMA_VERSION],
                )
                .map_err(open_failed)?;
            }
            Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(RepositoryError::OpenFailed {
                    path: path.to_path_buf(),
                    reason: format!("unsupported schema version {}", other),
                });
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Corrupted {
            path: self.db_path.clone(),
        })
    }

    /// Run SQLite's integrity check
    pub fn check_integrity(&self) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        let result: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|_| RepositoryError::Corrupted {
                path: self.db_path.clone(),
            })?;

        if result == "ok" {
            Ok(())
        } else {
            Err(RepositoryError::Corrupted {
                path: self.db_path.clone(),
            })
        }
    }

    /// Load every folder, entry and sync rule into a fresh index
    pub fn load(&self) -> Result<CatalogIndex, RepositoryError> {
        let conn = self.lock()?;
        let mut index = CatalogIndex::new();

        let mut stmt = conn.prepare(
            "SELECT id, path, thumbnail_generation, thumbnail_length FROM folders",
        )?;
        let folders = stmt.query_map([], |row| {
            let folder = Folder {
                id: folder_id_column(row, 0)?,
                path: row.get(1)?,
            };
            let page = PageRef {
                generation: row.get::<_, i64>(2)? as u64,
                len: row.get::<_, i64>(3)? as u64,
            };
            Ok((folder, page))
        })?;
        for row in folders {
            let (folder, page) = row?;
            index.set_page(folder.id, page);
            index.insert_folder(folder);
        }

        let mut stmt = conn.prepare(&format!("SELECT {} FROM assets", ENTRY_COLUMNS))?;
        let entries = stmt.query_map([], entry_from_row)?;
        for entry in entries {
            let entry = entry?;
            if index.folder(entry.folder_id).is_none() {
                return Err(RepositoryError::Corrupted {
                    path: self.db_path.clone(),
                });
            }
            index.upsert(&entry);
        }

        let mut stmt = conn.prepare(
            "SELECT source, destination, include_subfolders, delete_not_in_source
             FROM sync_rules ORDER BY position",
        )?;
        let rules = stmt
            .query_map([], |row| {
                Ok(SyncRule {
                    source: PathBuf::from(row.get::<_, String>(0)?),
                    destination: PathBuf::from(row.get::<_, String>(1)?),
                    include_subfolders: row.get(2)?,
                    delete_not_in_source: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        index.set_sync_rules(rules);

        Ok(index)
    }

    pub fn delete_folder(&self, id: FolderId) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM folders WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }

    /// Write all operations of a batch, and the page extents they produced,
    /// in one transaction
    pub fn write_batch(
        &self,
        ops: &[BatchOp],
        pages: &[(FolderId, PageRef)],
    ) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut add_folder = tx.prepare_cached(
                "INSERT INTO folders (id, path, thumbnail_generation, thumbnail_length)
                 VALUES (?1, ?2, 0, 0)",
            )?;
            let mut upsert = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO assets ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                ENTRY_COLUMNS
            ))?;
            let mut delete =
                tx.prepare_cached("DELETE FROM assets WHERE folder_id = ?1 AND file_name = ?2")?;
            let mut rename = tx.prepare_cached(
                "UPDATE assets SET file_name = ?3 WHERE folder_id = ?1 AND file_name = ?2",
            )?;
            let mut set_page = tx.prepare_cached(
                "UPDATE folders SET thumbnail_generation = ?2, thumbnail_length = ?3 WHERE id = ?1",
            )?;

            for op in ops {
                match op {
                    BatchOp::AddFolder(folder) => {
                        add_folder.execute(params![folder.id.to_string(), folder.path])?;
                    }
                    BatchOp::Upsert(entry) => {
                        upsert.execute(params![
                            entry.folder_id.to_string(),
                            entry.file_name,
                            entry.pixels.width as i64,
                            entry.pixels.height as i64,
                            entry.thumbnail_pixels.width as i64,
                            entry.thumbnail_pixels.height as i64,
                            entry.file_size as i64,
                            entry.created.timestamp_micros(),
                            entry.modified.timestamp_micros(),
                            entry.thumbnail_created.timestamp_micros(),
                            entry.rotation.degrees() as i64,
                            entry.fingerprints.exact,
                            entry.fingerprints.difference,
                            entry.fingerprints.perceptual,
                            entry.fingerprints.computed.bits() as i64,
                            entry.corrupted.set,
                            entry.corrupted.message,
                            entry.rotated.set,
                            entry.rotated.message,
                        ])?;
                    }
                    BatchOp::Remove {
                        folder_id,
                        file_name,
                    } => {
                        delete.execute(params![folder_id.to_string(), file_name])?;
                    }
                    BatchOp::Rename {
                        folder_id,
                        from,
                        to,
                    } => {
                        rename.execute(params![folder_id.to_string(), from, to])?;
                    }
                }
            }

            for (folder, page) in pages {
                set_page.execute(params![
                    folder.to_string(),
                    page.generation as i64,
                    page.len as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Point a folder at a new thumbnail page extent
    pub fn set_page(&self, folder: FolderId, page: PageRef) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE folders SET thumbnail_generation = ?2, thumbnail_length = ?3 WHERE id = ?1",
            params![folder.to_string(), page.generation as i64, page.len as i64],
        )?;
        Ok(())
    }

    /// Replace the stored sync rules
    pub fn replace_sync_rules(&self, rules: &[SyncRule]) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sync_rules", [])?;
        for (position, rule) in rules.iter().enumerate() {
            tx.execute(
                "INSERT INTO sync_rules
                 (position, source, destination, include_subfolders, delete_not_in_source)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    position as i64,
                    rule.source.to_string_lossy(),
                    rule.destination.to_string_lossy(),
                    rule.include_subfolders,
                    rule.delete_not_in_source,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Write a consistent copy of the database to `target`
    pub fn snapshot_to(&self, target: &Path) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.execute("VACUUM INTO ?1", [target.to_string_lossy()])
            .map_err(|e| RepositoryError::BackupFailed(e.to_string()))?;
        Ok(())
    }

    /// Fold the write-ahead log back into the database file
    pub fn checkpoint(&self) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}

fn folder_id_column(row: &Row<'_>, index: usize) -> rusqlite::Result<FolderId> {
    let value: String = row.get(index)?;
    FolderId::parse(&value)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(index, "folder_id".to_string(), Type::Text))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let degrees: i64 = row.get(10)?;
    let rotation = u16::try_from(degrees)
        .ok()
        .and_then(Rotation::from_degrees)
        .ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(10, "rotation".to_string(), Type::Integer)
        })?;

    Ok(CatalogEntry {
        folder_id: folder_id_column(row, 0)?,
        file_name: row.get(1)?,
        pixels: Dimensions::new(row.get::<_, i64>(2)? as u32, row.get::<_, i64>(3)? as u32),
        thumbnail_pixels: Dimensions::new(
            row.get::<_, i64>(4)? as u32,
            row.get::<_, i64>(5)? as u32,
        ),
        file_size: row.get::<_, i64>(6)? as u64,
        created: from_micros(row.get(7)?),
        modified: from_micros(row.get(8)?),
        thumbnail_created: from_micros(row.get(9)?),
        rotation,
        fingerprints: Fingerprints {
            exact: row.get(11)?,
            difference: row.get(12)?,
            perceptual: row.get(13)?,
            computed: FingerprintKinds::from_bits(row.get::<_, i64>(14)? as u8),
        },
        corrupted: Flag {
            set: row.get(15)?,
            message: row.get(16)?,
        },
        rotated: Flag {
            set: row.get(17)?,
            message: row.get(18)?,
        },
        thumbnail: None,
    })
}
