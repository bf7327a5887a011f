//! `internal_links`/`external_links` table access, including the
//! diff-by-natural-key reconciliation spec §4.7 requires so outgoing
//! link rows keep a stable identity across content edits, and the
//! rewrite/resolve helpers the link synchronizer (C9, spec §4.9) drives
//! off of lifecycle events.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct InternalLinkRow {
    pub source_id: String,
    pub target_id: Option<String>,
    pub target_title: String,
    pub display: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalLinkRow {
    pub source_id: String,
    pub url: String,
    pub label: Option<String>,
    pub position: i64,
}

/// Natural key for an outgoing internal link: the raw target text plus
/// display text plus an occurrence ordinal, so two identical `[[x]]`
/// refs in the same body get distinct, stable identities (spec §4.7).
type InternalKey = (String, String, usize);

/// Assign a 0-based occurrence index to each row sharing the same
/// `(target_title, display)` pair, in the order given.
pub fn with_occurrence_index(rows: &[InternalLinkRow]) -> Vec<(InternalKey, &InternalLinkRow)> {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    rows.iter()
        .map(|row| {
            let counter = seen
                .entry((row.target_title.clone(), row.display.clone()))
                .or_insert(0);
            let key = (row.target_title.clone(), row.display.clone(), *counter);
            *counter += 1;
            (key, row)
        })
        .collect()
}

/// Reconcile `source_id`'s outgoing internal links against `desired`:
/// delete rows whose natural key is no longer present, update rows
/// whose `target_id`/`position` changed, insert rows that are new.
pub fn replace_outgoing_internal(
    conn: &Connection,
    source_id: &str,
    desired: &[InternalLinkRow],
) -> Result<()> {
    let mut existing: HashMap<InternalKey, (i64, Option<String>, i64)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT rowid, target_id, target_title, display, position
             FROM internal_links WHERE source_id = ?1",
        )?;
        let rows = stmt.query_map(params![source_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, i64>(4)?,
            ))
        })?;
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        for row in rows {
            let (rowid, target_id, target_title, display, position) = row?;
            let counter = seen.entry((target_title.clone(), display.clone())).or_insert(0);
            let key = (target_title, display, *counter);
            *counter += 1;
            existing.insert(key, (rowid, target_id, position));
        }
    }

    let desired_keyed = with_occurrence_index(desired);
    let mut keep = std::collections::HashSet::new();

    for (key, row) in &desired_keyed {
        keep.insert(key.clone());
        match existing.get(key) {
            Some((rowid, cur_target, cur_position)) => {
                if cur_target.as_deref() != row.target_id.as_deref() || *cur_position != row.position {
                    conn.execute(
                        "UPDATE internal_links SET target_id = ?1, position = ?2 WHERE rowid = ?3",
                        params![row.target_id, row.position, rowid],
                    )?;
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO internal_links (source_id, target_id, target_title, display, position)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![source_id, row.target_id, row.target_title, row.display, row.position],
                )?;
            }
        }
    }

    for (key, (rowid, _, _)) in &existing {
        if !keep.contains(key) {
            conn.execute("DELETE FROM internal_links WHERE rowid = ?1", params![rowid])?;
        }
    }

    Ok(())
}

/// Same reconciliation, for external links (natural key: url + label).
pub fn replace_outgoing_external(
    conn: &Connection,
    source_id: &str,
    desired: &[ExternalLinkRow],
) -> Result<()> {
    type ExternalKey = (String, Option<String>, usize);
    let mut existing: HashMap<ExternalKey, (i64, i64)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT rowid, url, label, position FROM external_links WHERE source_id = ?1",
        )?;
        let rows = stmt.query_map(params![source_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?;
        let mut seen: HashMap<(String, Option<String>), usize> = HashMap::new();
        for row in rows {
            let (rowid, url, label, position) = row?;
            let counter = seen.entry((url.clone(), label.clone())).or_insert(0);
            let key = (url, label, *counter);
            *counter += 1;
            existing.insert(key, (rowid, position));
        }
    }

    let mut seen: HashMap<(String, Option<String>), usize> = HashMap::new();
    let mut keep = std::collections::HashSet::new();
    for row in desired {
        let counter = seen.entry((row.url.clone(), row.label.clone())).or_insert(0);
        let key: ExternalKey = (row.url.clone(), row.label.clone(), *counter);
        *counter += 1;
        keep.insert(key.clone());
        match existing.get(&key) {
            Some((rowid, cur_position)) => {
                if *cur_position != row.position {
                    conn.execute(
                        "UPDATE external_links SET position = ?1 WHERE rowid = ?2",
                        params![row.position, rowid],
                    )?;
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO external_links (source_id, url, label, position) VALUES (?1, ?2, ?3, ?4)",
                    params![source_id, row.url, row.label, row.position],
                )?;
            }
        }
    }
    for (key, (rowid, _)) in &existing {
        if !keep.contains(key) {
            conn.execute("DELETE FROM external_links WHERE rowid = ?1", params![rowid])?;
        }
    }
    Ok(())
}

/// Resolve every broken row whose `target_title` matches `title` to
/// `new_id` (spec §4.9, rename). Returns the number of rows resolved.
pub fn resolve_broken_by_title(conn: &Connection, title: &str, new_id: &str) -> Result<u64> {
    let count = conn.execute(
        "UPDATE internal_links SET target_id = ?1 WHERE target_id IS NULL AND target_title = ?2",
        params![new_id, title],
    )?;
    Ok(count as u64)
}

/// Rewrite every inbound link pointing at `old_id` to `new_id` (spec
/// §4.9, move).
pub fn rewrite_incoming_target(conn: &Connection, old_id: &str, new_id: &str) -> Result<u64> {
    let count = conn.execute(
        "UPDATE internal_links SET target_id = ?1 WHERE target_id = ?2",
        params![new_id, old_id],
    )?;
    Ok(count as u64)
}

/// Rewrite `source_id` on a note's own outgoing rows after a move.
pub fn rewrite_source_id(conn: &Connection, old_id: &str, new_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE internal_links SET source_id = ?1 WHERE source_id = ?2",
        params![new_id, old_id],
    )?;
    conn.execute(
        "UPDATE external_links SET source_id = ?1 WHERE source_id = ?2",
        params![new_id, old_id],
    )?;
    Ok(())
}

/// Flip every inbound link to `deleted_id` to broken, recording
/// `fallback_title` as the `target_title` (spec §4.9, delete).
pub fn break_incoming(conn: &Connection, deleted_id: &str, fallback_title: &str) -> Result<()> {
    conn.execute(
        "UPDATE internal_links SET target_id = NULL, target_title = ?1 WHERE target_id = ?2",
        params![fallback_title, deleted_id],
    )?;
    Ok(())
}

pub fn outgoing_internal(conn: &Connection, source_id: &str) -> Result<Vec<InternalLinkRow>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, target_title, display, position
         FROM internal_links WHERE source_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![source_id], row_to_internal)?;
    collect(rows)
}

pub fn incoming_internal(conn: &Connection, target_id: &str) -> Result<Vec<InternalLinkRow>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, target_title, display, position
         FROM internal_links WHERE target_id = ?1 ORDER BY source_id, position",
    )?;
    let rows = stmt.query_map(params![target_id], row_to_internal)?;
    collect(rows)
}

pub fn outgoing_external(conn: &Connection, source_id: &str) -> Result<Vec<ExternalLinkRow>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, url, label, position FROM external_links WHERE source_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![source_id], |r| {
        Ok(ExternalLinkRow {
            source_id: r.get(0)?,
            url: r.get(1)?,
            label: r.get(2)?,
            position: r.get(3)?,
        })
    })?;
    collect(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokenLinkGroup {
    pub target_title: String,
    pub sources: Vec<String>,
}

/// Broken-link query, grouped by `target_title` (spec §4.9).
pub fn broken_links(conn: &Connection) -> Result<Vec<BrokenLinkGroup>> {
    let mut stmt = conn.prepare(
        "SELECT target_title, source_id FROM internal_links
         WHERE target_id IS NULL ORDER BY target_title, source_id",
    )?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
    let mut groups: Vec<BrokenLinkGroup> = Vec::new();
    for row in rows {
        let (title, source) = row?;
        match groups.last_mut() {
            Some(g) if g.target_title == title => g.sources.push(source),
            _ => groups.push(BrokenLinkGroup {
                target_title: title,
                sources: vec![source],
            }),
        }
    }
    Ok(groups)
}

fn row_to_internal(r: &rusqlite::Row) -> rusqlite::Result<InternalLinkRow> {
    Ok(InternalLinkRow {
        source_id: r.get(0)?,
        target_id: r.get(1)?,
        target_title: r.get(2)?,
        display: r.get(3)?,
        position: r.get(4)?,
    })
}

fn collect<T>(rows: rusqlite::MappedRows<impl FnMut(&rusqlite::Row) -> rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
