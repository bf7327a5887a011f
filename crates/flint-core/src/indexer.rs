//! Indexer (C7): keeps the `notes`/`note_metadata`/`notes_fts`/link
//! tables in sync with a single note, or rebuilds the whole index from
//! the filesystem. Grounded on the teacher's `db::rebuild` (walk +
//! batched transaction + `ctrlc` interruption handling), adapted to
//! this system's single-transaction atomicity requirement (spec §5:
//! "rebuild runs in a transaction ... readers see either the pre- or
//! post-rebuild snapshot") rather than the teacher's periodic
//! checkpoint commits.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use walkdir::WalkDir;

use crate::db::{self, links::InternalLinkRow, notes::NoteRow};
use crate::error::{FlintError, Result};
use crate::id;
use crate::links;
use crate::note::{self, Note, RESERVED_FIELDS};

/// Files/directories the filesystem walk skips (spec §4.7): directory
/// names starting with `.` at the top level, and files starting with
/// `.` or `_`.
fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.')
}

fn is_skipped_file(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

fn note_row(note: &Note) -> NoteRow {
    NoteRow {
        id: note.id.clone(),
        title: note.title.clone(),
        content: note.body.clone(),
        note_type: note.note_type.clone(),
        filename: note.filename.clone(),
        path: note.path.to_string_lossy().to_string(),
        created: note.created,
        updated: note.updated,
        size: note.size as i64,
        content_hash: note.content_hash.clone(),
    }
}

/// Upsert a single note's rows: `notes`, `note_metadata`, the FTS row,
/// and its outgoing link rows, reconciled by diff (spec §4.7).
#[tracing::instrument(skip(conn, note, known_ids, title_to_id), fields(id = %note.id))]
pub fn upsert(
    conn: &Connection,
    note: &Note,
    known_ids: &HashSet<String>,
    title_to_id: &HashMap<String, String>,
) -> Result<()> {
    let full_metadata = note.full_metadata();
    db::notes::upsert(conn, &note_row(note))?;
    db::metadata::replace(conn, &note.id, &note.custom_metadata(), &RESERVED_FIELDS)?;
    let tags = db::metadata::tags_blob(&full_metadata);
    db::fts::replace(conn, &note.id, &note.title, &note.body, &tags)?;

    let extracted = links::extract(&note.body);
    let resolved = links::resolve_internal(&extracted.internal, known_ids, title_to_id);
    let desired_internal: Vec<InternalLinkRow> = resolved
        .into_iter()
        .map(|r| InternalLinkRow {
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

/// Remove a note's rows. Outgoing rows cascade via the `source_id`
/// foreign key; inbound internal links are flipped to broken first
/// (spec §4.7, §4.9).
#[tracing::instrument(skip(conn))]
pub fn remove(conn: &Connection, id: &str) -> Result<()> {
    let fallback_title = db::notes::get(conn, id)?
        .map(|row| row.title)
        .unwrap_or_else(|| id.to_string());
    db::links::break_incoming(conn, id, &fallback_title)?;
    db::fts::delete(conn, id)?;
    db::notes::delete(conn, id)?;
    Ok(())
}

/// Progress reported after each rebuild batch: `(processed, total)`.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize) + 'a;

/// Walk `workspace`, returning `(note_type_dir_name, path)` for every
/// `.md` file that isn't skipped (spec §4.7).
fn scan_markdown_files(workspace: &Path) -> Result<Vec<(String, std::path::PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(workspace).map_err(|e| FlintError::io("scan", &workspace.to_path_buf(), e))? {
        let entry = entry.map_err(|e| FlintError::io("scan", &workspace.to_path_buf(), e))?;
        let file_type = entry.file_type().map_err(|e| FlintError::io("stat", &entry.path(), e))?;
        let dir_name = entry.file_name().to_string_lossy().to_string();
        if !file_type.is_dir() || is_skipped_dir(&dir_name) {
            continue;
        }
        for sub in WalkDir::new(entry.path()).into_iter().filter_map(|e| e.ok()) {
            let path = sub.path();
            if !sub.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if is_skipped_file(&file_name) {
                continue;
            }
            files.push((dir_name.clone(), path.to_path_buf()));
        }
    }
    Ok(files)
}

/// Parse one file on disk into a `Note`, inferring its type from the
/// enclosing directory when the front matter doesn't name one.
fn load_note(dir_note_type: &str, path: &Path) -> Option<Note> {
    let raw = match std::fs::read_to_string(path) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable note during rebuild");
            return None;
        }
    };
    let slug = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let parsed_file = note::parse_file(&raw);
    if let Some(warning) = &parsed_file.warning {
        tracing::warn!(path = %path.display(), reason = %warning, "skipping note with malformed front matter");
        return None;
    }
    let title = parsed_file.title.unwrap_or_else(|| slug.clone());
    let note_type = parsed_file.note_type.unwrap_or_else(|| dir_note_type.to_string());
    let created = parsed_file.created.unwrap_or_else(chrono::Utc::now);
    let updated = parsed_file.updated.unwrap_or(created);
    let id = id::note_id(&note_type, &slug);
    let size = raw.len() as u64;
    let content_hash = crate::hash::content_hash(&parsed_file.metadata, &parsed_file.body);
    Some(Note {
        id,
        note_type,
        slug: slug.clone(),
        title,
        body: parsed_file.body,
        filename: format!("{slug}.md"),
        path: path.to_path_buf(),
        created,
        updated,
        size,
        content_hash,
        metadata: parsed_file.metadata,
    })
}

/// Clear and repopulate the entire index from the filesystem (spec
/// §4.7, §4.10). Runs inside a single transaction so concurrent readers
/// see either the pre- or post-rebuild snapshot; a Ctrl-C during the
/// walk aborts the whole rebuild rather than committing partial rows.
#[tracing::instrument(skip(db, workspace, progress), fields(workspace = %workspace.display()))]
pub fn rebuild(
    db: &db::Database,
    workspace: &Path,
    mut progress: Option<&mut ProgressCallback>,
) -> Result<usize> {
    let files = scan_markdown_files(workspace)?;
    let parsed: Vec<Note> = files
        .iter()
        .filter_map(|(note_type, path)| load_note(note_type, path))
        .collect();

    let known_ids: HashSet<String> = parsed.iter().map(|n| n.id.clone()).collect();
    let title_to_id: HashMap<String, String> = parsed.iter().map(|n| (n.title.clone(), n.id.clone())).collect();
    let total = parsed.len();

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = Arc::clone(&interrupted);
    let _ = ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    });

    let conn = db.writer();
    let tx = conn.unchecked_transaction()?;
    db::schema::clear_all_rows(&tx)?;

    const BATCH: usize = 200;
    for (i, note) in parsed.iter().enumerate() {
        upsert(&tx, note, &known_ids, &title_to_id)?;
        if ((i + 1) % BATCH == 0 || (i + 1) == total) && progress.is_some() {
            progress.as_mut().unwrap()(i + 1, total);
        }
        if interrupted.load(Ordering::SeqCst) {
            tracing::info!(indexed = i + 1, total, "rebuild interrupted, discarding partial index");
            return Err(FlintError::Io("rebuild interrupted".to_string()));
        }
    }

    tx.commit()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn setup(workspace: &Path) -> db::Database {
        let db_path = workspace.join(".flint-note").join("search.db");
        let (database, _) = db::Database::open(&db_path).unwrap();
        database
    }

    fn write_note(workspace: &Path, note_type: &str, slug: &str, content: &str) {
        let dir = workspace.join(note_type);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{slug}.md")), content).unwrap();
    }

    #[test]
    fn rebuild_indexes_every_note_exactly_once() {
        let dir = tempdir().unwrap();
        write_note(
            dir.path(),
            "general",
            "a",
            "---\ntitle: A\ntype: general\n---\nHello [[general/b]].\n",
        );
        write_note(dir.path(), "general", "b", "---\ntitle: B\ntype: general\n---\nWorld.\n");

        let database = setup(dir.path());
        let total = rebuild(&database, dir.path(), None).unwrap();
        assert_eq!(total, 2);
        assert_eq!(database.note_count().unwrap(), 2);

        let links = db::links::outgoing_internal(database.reader(), "general/a").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_id.as_deref(), Some("general/b"));
    }

    #[test]
    fn rebuild_skips_dotfiles_and_underscored_files() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "general", "keep", "---\ntitle: Keep\n---\nBody\n");
        write_note(dir.path(), "general", "_draft", "---\ntitle: Draft\n---\nBody\n");
        std::fs::create_dir_all(dir.path().join(".flint-note")).unwrap();
        std::fs::write(dir.path().join(".flint-note").join("junk.md"), "not a note").unwrap();

        let database = setup(dir.path());
        let total = rebuild(&database, dir.path(), None).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn remove_breaks_inbound_links() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "general", "a", "---\ntitle: A\n---\nSee [[general/b]].\n");
        write_note(dir.path(), "general", "b", "---\ntitle: B\n---\nBody\n");
        let database = setup(dir.path());
        rebuild(&database, dir.path(), None).unwrap();

        remove(database.writer(), "general/b").unwrap();
        assert_eq!(database.note_count().unwrap(), 1);
        let links = db::links::outgoing_internal(database.reader(), "general/a").unwrap();
        assert_eq!(links[0].target_id, None);
        assert_eq!(links[0].target_title, "B");
    }

    #[allow(dead_code)]
    fn unused(_: PathBuf) {}
}
