//! `notes_fts` virtual table access (spec §3, §4.6): `(id, title,
//! content, tags)` with the `porter unicode61` tokenizer.

use rusqlite::{params, Connection};

use crate::error::Result;

pub fn replace(conn: &Connection, id: &str, title: &str, content: &str, tags: &str) -> Result<()> {
    conn.execute("DELETE FROM notes_fts WHERE id = ?1", params![id])?;
    conn.execute(
        "INSERT INTO notes_fts (id, title, content, tags) VALUES (?1, ?2, ?3, ?4)",
        params![id, title, content, tags],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM notes_fts WHERE id = ?1", params![id])?;
    Ok(())
}
