//! Note store (C4): CRUD over the filesystem with front-matter-preserving
//! updates, protected-field enforcement, and atomic writes. Grounded on
//! the teacher's `store::Store` (`create_note`/`get_note`/`list_notes`),
//! reshaped around this system's `<type>/<slug>` identity, content-hash
//! optimistic concurrency (spec §4.3), and explicit lifecycle events
//! (spec §3, §4.4) instead of the teacher's template-driven creation.

use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::error::{FlintError, Result};
use crate::id;
use crate::metadata::MetadataMap;
use crate::note::{self, merge_metadata, reject_protected_fields, Note};
use crate::sync::LifecycleEvent;

/// A patch applied by `update`: `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub body: Option<String>,
    pub metadata: Option<MetadataMap>,
}

/// Write `contents` to `path` atomically: a sibling temp file, then a
/// rename (spec §4.4: "Writes file atomically (temp + rename)").
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| FlintError::io("create", &dir.to_path_buf(), e))?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    fs::write(&tmp, contents).map_err(|e| FlintError::io("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| FlintError::io("rename", &path.to_path_buf(), e))?;
    Ok(())
}

/// Load and parse the note at `identifier` (`<type>/<slug>`, with or
/// without `.md`) into a fully materialized [`Note`] (spec §4.4 `get`).
pub fn get(workspace: &Path, identifier: &str) -> Result<Note> {
    let (note_type, slug) = id::split_id(identifier)?;
    let path = id::note_path(workspace, note_type, slug);
    if !path.is_file() {
        return Err(FlintError::not_found("note", identifier));
    }
    let raw = fs::read_to_string(&path).map_err(|e| FlintError::io("read", &path, e))?;
    let parsed = note::parse_file(&raw);
    if let Some(reason) = &parsed.warning {
        return Err(FlintError::invalid("front matter", reason));
    }
    let title = parsed.title.unwrap_or_else(|| humanize(slug));
    let resolved_type = parsed.note_type.unwrap_or_else(|| note_type.to_string());
    let created = parsed.created.unwrap_or_else(Utc::now);
    let updated = parsed.updated.unwrap_or(created);
    let content_hash = crate::hash::content_hash(&parsed.metadata, &parsed.body);
    Ok(Note {
        id: id::note_id(&resolved_type, slug),
        note_type: resolved_type,
        slug: slug.to_string(),
        title,
        body: parsed.body,
        filename: format!("{slug}.md"),
        size: raw.len() as u64,
        path,
        created,
        updated,
        content_hash,
        metadata: parsed.metadata,
    })
}

fn humanize(slug: &str) -> String {
    slug.replace(['-', '_'], " ")
}

/// Create a new note (spec §4.4 `create`). Refuses creation if the
/// derived slug already exists on disk.
pub fn create(
    workspace: &Path,
    note_type: &str,
    title: &str,
    body: &str,
    metadata: MetadataMap,
) -> Result<(Note, LifecycleEvent)> {
    id::validate_name("note type", note_type)?;
    if title.trim().is_empty() {
        return Err(FlintError::invalid("title", "must not be empty"));
    }
    reject_protected_fields(&metadata)?;

    let slug = id::slugify(title);
    if slug.is_empty() {
        return Err(FlintError::invalid("title", "produces an empty slug"));
    }
    let path = id::note_path(workspace, note_type, &slug);
    if path.exists() {
        return Err(FlintError::already_exists(
            "note",
            id::note_id(note_type, &slug),
        ));
    }

    let now = Utc::now();
    let note = Note::new(
        workspace,
        note_type.to_string(),
        slug,
        title.to_string(),
        body.to_string(),
        metadata,
        now,
    );
    write_atomic(&path, &note.render())?;

    let mut note = note;
    note.size = note.render().len() as u64;
    Ok((note.clone(), LifecycleEvent::Created { id: note.id }))
}

/// Update a note's body and/or custom metadata (spec §4.4 `update`).
/// Rejects protected fields before touching disk; rejects a stale
/// `prior_hash` before touching disk.
pub fn update(
    workspace: &Path,
    identifier: &str,
    patch: UpdatePatch,
    prior_hash: &str,
) -> Result<(Note, LifecycleEvent)> {
    if let Some(metadata) = &patch.metadata {
        reject_protected_fields(metadata)?;
    }

    let mut note = get(workspace, identifier)?;
    if note.content_hash != prior_hash {
        return Err(FlintError::conflict_stale(
            &note.id,
            prior_hash,
            &note.content_hash,
        ));
    }

    if let Some(body) = patch.body {
        note.body = body;
    }
    if let Some(metadata_patch) = patch.metadata {
        let mut current = note.custom_metadata();
        merge_metadata(&mut current, metadata_patch);
        note.metadata = current;
    }
    note.updated = Utc::now();
    note.recompute_hash();

    write_atomic(&note.path, &note.render())?;
    note.size = note.render().len() as u64;

    let event = LifecycleEvent::Updated { id: note.id.clone() };
    Ok((note, event))
}

/// Change a note's title (spec §4.4 `rename`). Filename and id are
/// unchanged; the in-body H1 is rewritten only when `rewrite_h1` is set
/// (spec §9, Open Question 1 — off by default).
pub fn rename(
    workspace: &Path,
    identifier: &str,
    new_title: &str,
    prior_hash: &str,
    rewrite_h1: bool,
) -> Result<(Note, LifecycleEvent)> {
    if new_title.trim().is_empty() {
        return Err(FlintError::invalid("title", "must not be empty"));
    }
    let mut note = get(workspace, identifier)?;
    if note.content_hash != prior_hash {
        return Err(FlintError::conflict_stale(
            &note.id,
            prior_hash,
            &note.content_hash,
        ));
    }
    let old_title = note.title.clone();
    if rewrite_h1 {
        note.body = rewrite_h1_heading(&note.body, &old_title, new_title);
    }
    note.title = new_title.to_string();
    note.updated = Utc::now();
    note.recompute_hash();

    write_atomic(&note.path, &note.render())?;
    note.size = note.render().len() as u64;

    let event = LifecycleEvent::Renamed {
        id: note.id.clone(),
        old_title,
        new_title: new_title.to_string(),
    };
    Ok((note, event))
}

/// Rewrite the first `# <old_title>` H1 line to `# <new_title>`, leaving
/// every other line untouched (spec §9, Open Question 1).
fn rewrite_h1_heading(body: &str, old_title: &str, new_title: &str) -> String {
    let needle = format!("# {old_title}");
    let mut replaced = false;
    body.lines()
        .map(|line| {
            if !replaced && line.trim_end() == needle {
                replaced = true;
                format!("# {new_title}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + if body.ends_with('\n') { "\n" } else { "" }
}

/// Move a note to a different type directory (spec §4.4 `move`). The
/// id changes; the caller (workspace coordinator) is responsible for
/// rewriting incoming links via the returned `Moved` event.
pub fn move_note(
    workspace: &Path,
    identifier: &str,
    new_type: &str,
    prior_hash: &str,
) -> Result<(Note, LifecycleEvent)> {
    id::validate_name("note type", new_type)?;
    let mut note = get(workspace, identifier)?;
    if note.content_hash != prior_hash {
        return Err(FlintError::conflict_stale(
            &note.id,
            prior_hash,
            &note.content_hash,
        ));
    }
    let old_id = note.id.clone();
    let old_path = note.path.clone();
    let new_path = id::note_path(workspace, new_type, &note.slug);
    if new_path.exists() {
        return Err(FlintError::already_exists(
            "note",
            id::note_id(new_type, &note.slug),
        ));
    }

    if let Some(parent) = new_path.parent() {
        fs::create_dir_all(parent).map_err(|e| FlintError::io("create", &parent.to_path_buf(), e))?;
    }
    fs::rename(&old_path, &new_path).map_err(|e| FlintError::io("rename", &new_path, e))?;

    note.note_type = new_type.to_string();
    note.path = new_path;
    note.id = id::note_id(new_type, &note.slug);
    note.updated = Utc::now();
    write_atomic(&note.path, &note.render())?;
    note.size = note.render().len() as u64;

    let event = LifecycleEvent::Moved {
        old_id,
        new_id: note.id.clone(),
    };
    Ok((note, event))
}

/// Delete a note (spec §4.4 `delete`). `confirm` must be `true`; this
/// mirrors the `deletion.require_confirmation` contract at the tool
/// boundary rather than re-deriving it here. `backup_dir`, when set
/// (`deletion.create_backups`, spec §6), receives a copy of the note file
/// before removal, named `<id-with-slashes-as-dashes>-<unix-seconds>.md`
/// so repeated deletes of the same id never collide.
pub fn delete(
    workspace: &Path,
    identifier: &str,
    prior_hash: &str,
    confirm: bool,
    backup_dir: Option<&Path>,
) -> Result<LifecycleEvent> {
    if !confirm {
        return Err(FlintError::invalid("delete", "requires confirm=true"));
    }
    let note = get(workspace, identifier)?;
    if note.content_hash != prior_hash {
        return Err(FlintError::conflict_stale(
            &note.id,
            prior_hash,
            &note.content_hash,
        ));
    }
    if let Some(backup_dir) = backup_dir {
        fs::create_dir_all(backup_dir).map_err(|e| FlintError::io("create", &backup_dir.to_path_buf(), e))?;
        let backup_name = format!("{}-{}.md", note.id.replace('/', "-"), Utc::now().timestamp());
        let backup_path = backup_dir.join(backup_name);
        fs::copy(&note.path, &backup_path).map_err(|e| FlintError::io("backup", &backup_path, e))?;
    }
    fs::remove_file(&note.path).map_err(|e| FlintError::io("delete", &note.path, e))?;
    Ok(LifecycleEvent::Deleted { id: note.id })
}

/// Outcome of one item in a batched update (spec §4.4, §7: "batched
/// operations never abort siblings on one item's failure").
pub struct BatchItemResult {
    pub identifier: String,
    pub result: Result<Note>,
}

/// A single request within `update_batch`.
pub struct BatchUpdateRequest {
    pub identifier: String,
    pub patch: UpdatePatch,
    pub prior_hash: String,
}

/// Apply each update independently; a failure on one item never
/// prevents the others from committing (spec §4.4, §7).
pub fn update_batch(
    workspace: &Path,
    requests: Vec<BatchUpdateRequest>,
) -> Vec<(BatchItemResult, Option<LifecycleEvent>)> {
    requests
        .into_iter()
        .map(|req| {
            let outcome = update(workspace, &req.identifier, req.patch, &req.prior_hash);
            match outcome {
                Ok((note, event)) => (
                    BatchItemResult {
                        identifier: req.identifier,
                        result: Ok(note),
                    },
                    Some(event),
                ),
                Err(e) => (
                    BatchItemResult {
                        identifier: req.identifier,
                        result: Err(e),
                    },
                    None,
                ),
            }
        })
        .collect()
}
