//! Identity resolution (C2): mapping between a note's canonical id
//! (`<type>/<slug>`), its filesystem path, and the slug derived from a
//! title. Grounded on the teacher's `slugify`/`filename` pair in
//! `src/lib/id.rs`, reshaped around this system's `<type>/<slug>` id
//! instead of the teacher's `qp-<hash>` scheme.

use std::path::{Path, PathBuf};

use crate::error::{FlintError, Result};

/// Maximum slug length (spec §4.2).
const MAX_SLUG_LEN: usize = 120;

/// The directory name reserved for workspace metadata; note-type
/// directories may not collide with it or its derivatives.
pub const METADATA_DIR: &str = ".flint-note";

/// Platform-reserved device names (Windows), rejected regardless of host
/// OS so workspaces stay portable.
const PLATFORM_RESERVED: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Lowercase a title, collapse runs of non-alphanumeric characters to a
/// single `-`, trim leading/trailing `-`, and cap the result at
/// [`MAX_SLUG_LEN`] characters (spec §4.2).
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_sep = true; // swallow any leading separator
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || (!ch.is_ascii() && ch.is_alphanumeric()) {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// The name validator from spec §4.2: `[A-Za-z0-9_-]+`, length 1..=255.
/// Used for note-type names and (optionally) explicit slugs supplied by
/// callers instead of derived from a title.
pub fn validate_name(context: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > 255 {
        return Err(FlintError::invalid(
            context,
            "must be 1 to 255 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(FlintError::invalid(
            context,
            "must match [A-Za-z0-9_-]+",
        ));
    }
    reject_reserved(context, name)
}

/// Reject platform-reserved device names and anything in the
/// `.flint-note` metadata family (spec §4.2).
pub fn reject_reserved(context: &str, name: &str) -> Result<()> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.split('.').next().unwrap_or(&lower);
    if PLATFORM_RESERVED.contains(&stem) {
        return Err(FlintError::invalid(
            context,
            format!("{name:?} is a platform-reserved name"),
        ));
    }
    if lower == METADATA_DIR || lower.starts_with(&format!("{METADATA_DIR}.")) {
        return Err(FlintError::invalid(
            context,
            format!("{name:?} collides with the workspace metadata directory"),
        ));
    }
    Ok(())
}

/// Canonical id: `"{type}/{slug}"`.
pub fn note_id(note_type: &str, slug: &str) -> String {
    format!("{note_type}/{slug}")
}

/// Split a canonical id into `(type, slug)`, stripping a trailing
/// `.md` extension if the caller passed one (spec §4.4: "Identifier may
/// be `<type>/<slug>` with or without `.md`").
pub fn split_id(identifier: &str) -> Result<(&str, &str)> {
    let trimmed = identifier.strip_suffix(".md").unwrap_or(identifier);
    match trimmed.split_once('/') {
        Some((note_type, slug)) if !note_type.is_empty() && !slug.is_empty() => {
            Ok((note_type, slug))
        }
        _ => Err(FlintError::invalid(
            "identifier",
            format!("{identifier:?} is not of the form <type>/<slug>"),
        )),
    }
}

/// Absolute filesystem path for a note: `workspace/type/slug.md`.
pub fn note_path(workspace: &Path, note_type: &str, slug: &str) -> PathBuf {
    workspace.join(note_type).join(format!("{slug}.md"))
}

/// The `.flint-note` metadata directory beneath a workspace root.
pub fn metadata_dir(workspace: &Path) -> PathBuf {
    workspace.join(METADATA_DIR)
}
