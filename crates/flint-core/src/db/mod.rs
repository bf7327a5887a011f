//! Index database (C6): schema + connection lifecycle for
//! notes/metadata/FTS/links, exposing a writable handle (used by the
//! indexer and synchronizer) and a read-only handle (used by the search
//! engine). Grounded on the teacher's `db::Database::open` (WAL mode,
//! schema versioning, rebuild-on-mismatch), extended with the second,
//! read-only connection spec §4.6 and §5 require for reader/writer
//! separation.

pub mod fts;
pub mod links;
pub mod metadata;
pub mod notes;
pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::error::{FlintError, Result};

/// Default busy-timeout applied to the read-only handle (spec §4.6, §5).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Owns both SQLite connections backing the index.
pub struct Database {
    write: Connection,
    read: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (creating if absent) the index database at
    /// `<workspace>/.flint-note/search.db`. Returns whether the caller
    /// should follow up with a full rebuild.
    #[tracing::instrument(skip_all, fields(path = %db_path.display()))]
    pub fn open(db_path: &Path) -> Result<(Self, bool)> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FlintError::io("create", &parent.to_path_buf(), e))?;
        }

        let write = Connection::open(db_path)?;
        write.pragma_update(None, "journal_mode", "WAL")?;
        write.pragma_update(None, "foreign_keys", "ON")?;
        write.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;

        let needs_rebuild = schema::create_schema(&write)?;

        let read = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        read.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        read.pragma_update(None, "foreign_keys", "ON")?;

        Ok((
            Database {
                write,
                read,
                path: db_path.to_path_buf(),
            },
            needs_rebuild,
        ))
    }

    pub fn writer(&self) -> &Connection {
        &self.write
    }

    pub fn reader(&self) -> &Connection {
        &self.read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn note_count(&self) -> Result<i64> {
        Ok(self
            .read
            .query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.write.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }
}
