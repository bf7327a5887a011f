//! Link synchronizer (C9): the state machine that keeps
//! `internal_links`/`external_links` consistent with lifecycle events
//! raised by the note store (C4). Grounded on the teacher's
//! `index::links` update path, reshaped around this system's explicit
//! `Created`/`Updated`/`Renamed`/`Moved`/`Deleted` events (spec §4.9).

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::db;
use crate::error::Result;
use crate::indexer;
use crate::links;
use crate::note::Note;

/// A lifecycle event raised by the note store as it mutates the
/// filesystem and `notes` row for a single note.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Created { id: String },
    Updated { id: String },
    Renamed { id: String, old_title: String, new_title: String },
    Moved { old_id: String, new_id: String },
    Deleted { id: String },
}

/// Result of handling a single event, surfaced back to the caller for
/// logging/tool responses (spec §4.9: "report the count of resolved
/// links").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub resolved_incoming: u64,
    pub rewritten_incoming: u64,
}

/// Re-extract and reconcile a note's outgoing link rows against the
/// current id/title universe. Used by both `Created` and `Updated`.
fn resync_outgoing(conn: &Connection, note: &Note) -> Result<()> {
    let known_ids: HashSet<String> = db::notes::all_ids(conn)?.into_iter().collect();
    let title_to_id: HashMap<String, String> = db::notes::all_titles(conn)?
        .into_iter()
        .map(|(title, id)| (title, id))
        .collect();

    let extracted = links::extract(&note.body);
    let resolved = links::resolve_internal(&extracted.internal, &known_ids, &title_to_id);
    let desired_internal: Vec<db::links::InternalLinkRow> = resolved
        .into_iter()
        .map(|r| db::links::InternalLinkRow {
            source_id: note.id.clone(),
            target_id: r.target_note_id,
            target_title: r.target_title,
            display: r.display,
            position: r.position as i64,
        })
        .collect();
    db::links::replace_outgoing_internal(conn, &note.id, &desired_internal)?;

    let desired_external: Vec<db::links::ExternalLinkRow> = extracted
        .external
        .into_iter()
        .map(|e| db::links::ExternalLinkRow {
            source_id: note.id.clone(),
            url: e.url,
            label: e.label,
            position: e.position as i64,
        })
        .collect();
    db::links::replace_outgoing_external(conn, &note.id, &desired_external)?;
    Ok(())
}

/// Drive the link graph from a single lifecycle event (spec §4.9).
/// `note` supplies the current body/title for events that need to
/// re-extract or report on link state; it is unused for `Deleted`.
#[tracing::instrument(skip(conn, note), fields(event = ?event))]
pub fn handle(conn: &Connection, event: &LifecycleEvent, note: Option<&Note>) -> Result<SyncOutcome> {
    match event {
        LifecycleEvent::Created { id } | LifecycleEvent::Updated { id } => {
            let note = note.expect("Created/Updated events carry the affected note");
            debug_assert_eq!(&note.id, id);
            resync_outgoing(conn, note)?;
            Ok(SyncOutcome::default())
        }
        LifecycleEvent::Renamed { id, new_title, .. } => {
            db::notes::update_title(conn, id, new_title, chrono::Utc::now())?;
            let resolved = db::links::resolve_broken_by_title(conn, new_title, id)?;
            Ok(SyncOutcome {
                resolved_incoming: resolved,
                rewritten_incoming: 0,
            })
        }
        LifecycleEvent::Moved { old_id, new_id } => {
            let rewritten = db::links::rewrite_incoming_target(conn, old_id, new_id)?;
            db::links::rewrite_source_id(conn, old_id, new_id)?;
            Ok(SyncOutcome {
                resolved_incoming: 0,
                rewritten_incoming: rewritten,
            })
        }
        LifecycleEvent::Deleted { id } => {
            indexer::remove(conn, id)?;
            Ok(SyncOutcome::default())
        }
    }
}

/// Broken-link report (spec §4.9's final line): grouped by target title.
pub fn broken_links(conn: &Connection) -> Result<Vec<db::links::BrokenLinkGroup>> {
    db::links::broken_links(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::metadata::MetadataMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_note(id: &str, title: &str, body: &str) -> Note {
        Note {
            id: id.to_string(),
            note_type: "general".to_string(),
            slug: id.split('/').next_back().unwrap().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            filename: format!("{}.md", id.split('/').next_back().unwrap()),
            path: PathBuf::from(format!("/vault/{id}.md")),
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
            size: body.len() as u64,
            content_hash: "deadbeef".to_string(),
            metadata: MetadataMap::new(),
        }
    }

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let (db, _) = Database::open(&dir.path().join("search.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn created_resolves_against_existing_titles() {
        let (_dir, db) = open_db();
        let b = sample_note("general/b", "Bee", "Nothing here.");
        crate::indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let a = sample_note("general/a", "Aye", "See [[Bee]] for more.");
        handle(db.writer(), &LifecycleEvent::Created { id: a.id.clone() }, Some(&a)).unwrap();

        let rows = db::links::outgoing_internal(db.writer(), "general/a").unwrap();
        assert_eq!(rows[0].target_id.as_deref(), Some("general/b"));
    }

    #[test]
    fn renamed_resolves_broken_links_waiting_on_the_new_title() {
        let (_dir, db) = open_db();
        let a = sample_note("general/a", "Aye", "See [[Future Title]].");
        crate::indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        let broken = db::links::outgoing_internal(db.writer(), "general/a").unwrap();
        assert_eq!(broken[0].target_id, None);

        let b = sample_note("general/b", "Old Title", "Body");
        crate::indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let outcome = handle(
            db.writer(),
            &LifecycleEvent::Renamed {
                id: "general/b".to_string(),
                old_title: "Old Title".to_string(),
                new_title: "Future Title".to_string(),
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome.resolved_incoming, 1);

        let rows = db::links::outgoing_internal(db.writer(), "general/a").unwrap();
        assert_eq!(rows[0].target_id.as_deref(), Some("general/b"));
    }

    #[test]
    fn moved_rewrites_incoming_and_outgoing_source_ids() {
        let (_dir, db) = open_db();
        let b = sample_note("general/b", "Bee", "Body");
        crate::indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();
        let a = sample_note("general/a", "Aye", "See [[general/b]].");
        crate::indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();

        let outcome = handle(
            db.writer(),
            &LifecycleEvent::Moved {
                old_id: "general/b".to_string(),
                new_id: "projects/b".to_string(),
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome.rewritten_incoming, 1);

        let rows = db::links::outgoing_internal(db.writer(), "general/a").unwrap();
        assert_eq!(rows[0].target_id.as_deref(), Some("projects/b"));
    }

    #[test]
    fn deleted_breaks_incoming_links_and_reports_them_grouped() {
        let (_dir, db) = open_db();
        let b = sample_note("general/b", "Bee", "Body");
        crate::indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();
        let a = sample_note("general/a", "Aye", "See [[general/b]] and [[general/b]] again.");
        crate::indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();

        handle(db.writer(), &LifecycleEvent::Deleted { id: "general/b".to_string() }, None).unwrap();

        let groups = broken_links(db.reader()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].target_title, "Bee");
        assert_eq!(groups[0].sources.len(), 2);
    }
}
