//! Index database schema (C6, spec §4.6). Grounded on the teacher's
//! `db::schema` (versioned `index_meta` table, `execute_batch` of one
//! DDL blob, `FTS5` virtual table with `porter unicode61`), reshaped
//! around this system's five tables instead of the teacher's
//! notes/tags/edges/unresolved set.

use rusqlite::Connection;

use crate::error::Result;

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    type TEXT NOT NULL,
    filename TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    size INTEGER NOT NULL,
    content_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notes_type ON notes(type);
CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated);

CREATE TABLE IF NOT EXISTS note_metadata (
    note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT,
    value_type TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_note_metadata_note_id ON note_metadata(note_id);
CREATE INDEX IF NOT EXISTS idx_note_metadata_key_value ON note_metadata(key, value);

CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
    id UNINDEXED,
    title,
    content,
    tags,
    tokenize='porter unicode61'
);

CREATE TABLE IF NOT EXISTS internal_links (
    source_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    target_id TEXT,
    target_title TEXT NOT NULL,
    display TEXT NOT NULL,
    position INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_internal_links_source ON internal_links(source_id);
CREATE INDEX IF NOT EXISTS idx_internal_links_target ON internal_links(target_id);
CREATE INDEX IF NOT EXISTS idx_internal_links_target_title ON internal_links(target_title);

CREATE TABLE IF NOT EXISTS external_links (
    source_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    label TEXT,
    position INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_external_links_source ON external_links(source_id);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

fn drop_all_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DROP TABLE IF EXISTS notes", [])?;
    conn.execute("DROP TABLE IF EXISTS note_metadata", [])?;
    conn.execute("DROP TABLE IF EXISTS notes_fts", [])?;
    conn.execute("DROP TABLE IF EXISTS internal_links", [])?;
    conn.execute("DROP TABLE IF EXISTS external_links", [])?;
    conn.execute("DROP TABLE IF EXISTS index_meta", [])?;
    Ok(())
}

/// `true` if the caller should follow up with a full `Indexer::rebuild`
/// (schema was just created, or recreated after a version mismatch).
pub fn create_schema(conn: &Connection) -> Result<bool> {
    let current_version: Option<i32> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'schema_version'",
            [],
            |r| r.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .ok();

    let needs_rebuild = match current_version {
        None => {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                [CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            true
        }
        Some(v) if v == CURRENT_SCHEMA_VERSION => false,
        Some(v) => {
            tracing::info!(from = v, to = CURRENT_SCHEMA_VERSION, "rebuilding index schema");
            drop_all_tables(conn)?;
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                [CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            true
        }
    };

    Ok(needs_rebuild)
}

/// Wipe every row from every index table, keeping the schema and the
/// recorded schema version (used by `Indexer::rebuild`).
pub fn clear_all_rows(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM internal_links", [])?;
    conn.execute("DELETE FROM external_links", [])?;
    conn.execute("DELETE FROM note_metadata", [])?;
    conn.execute("DELETE FROM notes_fts", [])?;
    conn.execute("DELETE FROM notes", [])?;
    Ok(())
}
