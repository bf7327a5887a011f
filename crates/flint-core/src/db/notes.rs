//! `notes` table access. Grounded on the teacher's `db::notes::read`
//! row-mapping style (one `NoteRow`-shaped struct, a `FromRow`-ish
//! closure passed to `query_row`/`query_map`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub note_type: String,
    pub filename: String,
    pub path: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub size: i64,
    pub content_hash: String,
}

pub(crate) fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<NoteRow> {
    let created: String = row.get("created")?;
    let updated: String = row.get("updated")?;
    Ok(NoteRow {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        note_type: row.get("type")?,
        filename: row.get("filename")?,
        path: row.get("path")?,
        created: parse_rfc3339(&created),
        updated: parse_rfc3339(&updated),
        size: row.get("size")?,
        content_hash: row.get("content_hash")?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Insert-or-replace a `notes` row (spec §4.7 upsert).
pub fn upsert(conn: &Connection, row: &NoteRow) -> Result<()> {
    conn.execute(
        "INSERT INTO notes (id, title, content, type, filename, path, created, updated, size, content_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            type = excluded.type,
            filename = excluded.filename,
            path = excluded.path,
            created = excluded.created,
            updated = excluded.updated,
            size = excluded.size,
            content_hash = excluded.content_hash",
        params![
            row.id,
            row.title,
            row.content,
            row.note_type,
            row.filename,
            row.path,
            row.created.to_rfc3339(),
            row.updated.to_rfc3339(),
            row.size,
            row.content_hash,
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<NoteRow>> {
    Ok(conn
        .query_row("SELECT * FROM notes WHERE id = ?1", params![id], row_to_note)
        .optional()?)
}

pub fn exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM notes WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn all_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM notes")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for r in rows {
        ids.push(r?);
    }
    Ok(ids)
}

pub fn all_titles(conn: &Connection) -> Result<std::collections::HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT id, title FROM notes")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(1)?, r.get::<_, String>(0)?)))?;
    let mut map = std::collections::HashMap::new();
    for r in rows {
        let (title, id) = r?;
        map.insert(title, id);
    }
    Ok(map)
}

/// Update only `title`/`updated` (used by rename).
pub fn update_title(conn: &Connection, id: &str, title: &str, updated: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE notes SET title = ?1, updated = ?2 WHERE id = ?3",
        params![title, updated.to_rfc3339(), id],
    )?;
    Ok(())
}
