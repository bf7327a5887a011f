//! `note_metadata` table access (spec §4.6).

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::metadata::{MetadataMap, MetadataValue};

/// Replace every metadata row for `note_id` with `metadata`, skipping
/// reserved keys (spec §4.7: "insert new rows (skipping reserved keys)").
pub fn replace(
    conn: &Connection,
    note_id: &str,
    metadata: &MetadataMap,
    reserved: &[&str],
) -> Result<()> {
    conn.execute(
        "DELETE FROM note_metadata WHERE note_id = ?1",
        params![note_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO note_metadata (note_id, key, value, value_type) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (key, value) in metadata {
        if reserved.contains(&key.as_str()) {
            continue;
        }
        stmt.execute(params![note_id, key, value.to_serialized(), value.value_type()])?;
    }
    Ok(())
}

pub fn fetch(conn: &Connection, note_id: &str) -> Result<MetadataMap> {
    let mut stmt =
        conn.prepare("SELECT key, value, value_type FROM note_metadata WHERE note_id = ?1")?;
    let rows = stmt.query_map(params![note_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, Option<String>>(1)?,
            r.get::<_, String>(2)?,
        ))
    })?;
    let mut map = MetadataMap::new();
    for r in rows {
        let (key, value, value_type) = r?;
        let value = MetadataValue::from_serialized(&value_type, &value.unwrap_or_default());
        map.insert(key, value);
    }
    Ok(map)
}

/// Build the `tags` text blob the FTS row carries alongside title/content
/// (spec §3's FTS row shape): the `tags` metadata key joined by spaces,
/// if present and list-shaped.
pub fn tags_blob(metadata: &MetadataMap) -> String {
    match metadata.get("tags") {
        Some(MetadataValue::List(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        Some(MetadataValue::String(s)) => s.clone(),
        _ => String::new(),
    }
}
