//! Note-type descriptions (spec §6: `<type>_description.md`) and the
//! note-type directory lifecycle (`note_types.auto_create_directories`,
//! `require_descriptions`). Grounded on the teacher's per-type template
//! handling in `store::load_template`/`create_default_templates`,
//! reshaped around this system's free-text description file instead of
//! the teacher's fixed four note types and Markdown templates.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::WorkspaceConfig;
use crate::error::{FlintError, Result};
use crate::id;

/// Summary of a note type as reported by `list_note_types`/`get_note_type_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTypeInfo {
    pub name: String,
    pub directory: PathBuf,
    pub description: Option<String>,
    pub note_count: usize,
}

fn description_path(workspace: &Path, note_type: &str) -> PathBuf {
    id::metadata_dir(workspace).join(format!("{note_type}_description.md"))
}

/// Create a note type: validate its name, optionally create its
/// directory (per `note_types.auto_create_directories`), and write its
/// description file when one is supplied or required.
pub fn create(
    workspace: &Path,
    config: &WorkspaceConfig,
    name: &str,
    description: Option<&str>,
) -> Result<NoteTypeInfo> {
    id::validate_name("note type", name)?;

    let dir = workspace.join(name);
    if dir.exists() {
        return Err(FlintError::already_exists("note type", name));
    }
    if config.note_types.auto_create_directories {
        fs::create_dir_all(&dir).map_err(|e| FlintError::io("create", &dir, e))?;
    }

    if description.is_none() && config.note_types.require_descriptions {
        return Err(FlintError::invalid(
            "note type",
            format!("{name:?} requires a description (note_types.require_descriptions is set)"),
        ));
    }

    if let Some(text) = description {
        write_description(workspace, name, text)?;
    }

    Ok(NoteTypeInfo {
        name: name.to_string(),
        directory: dir,
        description: description.map(str::to_string),
        note_count: 0,
    })
}

/// Overwrite a note type's description file.
pub fn update_description(workspace: &Path, name: &str, description: &str) -> Result<()> {
    write_description(workspace, name, description)
}

fn write_description(workspace: &Path, name: &str, text: &str) -> Result<()> {
    let path = description_path(workspace, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FlintError::io("create", &parent.to_path_buf(), e))?;
    }
    fs::write(&path, text).map_err(|e| FlintError::io("write", &path, e))
}

fn read_description(workspace: &Path, name: &str) -> Option<String> {
    fs::read_to_string(description_path(workspace, name)).ok()
}

fn count_notes(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
                .count()
        })
        .unwrap_or(0)
}

/// Info for a single note type (directory + description + note count).
pub fn info(workspace: &Path, name: &str) -> Result<NoteTypeInfo> {
    let dir = workspace.join(name);
    if !dir.is_dir() {
        return Err(FlintError::not_found("note type", name));
    }
    Ok(NoteTypeInfo {
        name: name.to_string(),
        note_count: count_notes(&dir),
        description: read_description(workspace, name),
        directory: dir,
    })
}

/// Every note type presently represented by a top-level directory
/// (spec §4.7's directory-scan rule: skip names starting with `.`).
pub fn list(workspace: &Path) -> Result<Vec<NoteTypeInfo>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(workspace).map_err(|e| FlintError::io("scan", &workspace.to_path_buf(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FlintError::io("scan", &workspace.to_path_buf(), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        out.push(NoteTypeInfo {
            note_count: count_notes(&entry.path()),
            description: read_description(workspace, &name),
            directory: entry.path(),
            name,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}
