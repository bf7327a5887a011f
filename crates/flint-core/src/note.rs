//! The `Note` record (spec §3) and the front-matter assembly/disassembly
//! that sits between it and the raw file on disk. Reserved fields
//! (`title`, `type`, `created`, `updated`, `filename`) live as first-class
//! struct fields; everything else lives in the open-ended `metadata` map.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::error::{FlintError, Result};
use crate::frontmatter::{self, ParseOutcome};
use crate::hash;
use crate::id;
use crate::metadata::{MetadataMap, MetadataValue};

/// The reserved front-matter keys that always reflect canonical `Note`
/// fields rather than the open-ended `metadata` map (spec §3, §4.4).
pub const RESERVED_FIELDS: [&str; 5] = ["title", "type", "created", "updated", "filename"];

/// Fields an update patch may never set directly (spec §4.4, §7).
pub const PROTECTED_FIELDS: [&str; 3] = ["title", "filename", "type"];

pub fn is_protected(field: &str) -> bool {
    PROTECTED_FIELDS.contains(&field)
}

/// A single note, fully materialized: canonical identity, reserved
/// fields, body, custom metadata, and the content hash over all of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub note_type: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub filename: String,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub size: u64,
    pub content_hash: String,
    pub metadata: MetadataMap,
}

impl Note {
    /// Build a new note's fields ready for a first write. `content_hash`
    /// is computed over `metadata` (custom fields only) + `body`.
    pub fn new(
        workspace: &std::path::Path,
        note_type: String,
        slug: String,
        title: String,
        body: String,
        metadata: MetadataMap,
        now: DateTime<Utc>,
    ) -> Self {
        let id = id::note_id(&note_type, &slug);
        let path = id::note_path(workspace, &note_type, &slug);
        let filename = format!("{slug}.md");
        let content_hash = hash::content_hash(&metadata, &body);
        Note {
            id,
            note_type,
            slug,
            title,
            body: body.clone(),
            filename,
            size: 0,
            path,
            created: now,
            updated: now,
            content_hash,
            metadata,
        }
    }

    /// Render this note as file contents: reserved fields first (in the
    /// order `title, type, created, updated`), then custom metadata in
    /// its existing insertion order (spec §4.1: "reserved fields first,
    /// then insertion order").
    pub fn render(&self) -> String {
        let mut doc = MetadataMap::new();
        doc.insert("title".to_string(), MetadataValue::String(self.title.clone()));
        doc.insert(
            "type".to_string(),
            MetadataValue::String(self.note_type.clone()),
        );
        doc.insert(
            "created".to_string(),
            MetadataValue::String(self.created.to_rfc3339()),
        );
        doc.insert(
            "updated".to_string(),
            MetadataValue::String(self.updated.to_rfc3339()),
        );
        for (k, v) in &self.metadata {
            if !RESERVED_FIELDS.contains(&k.as_str()) {
                doc.insert(k.clone(), v.clone());
            }
        }
        format!("{}{}", frontmatter::serialize(&doc), self.body)
    }

    /// Recompute the content hash over the current body + non-reserved
    /// metadata (spec §4.3).
    pub fn recompute_hash(&mut self) {
        self.content_hash = hash::content_hash(&self.custom_metadata(), &self.body);
    }

    /// The subset of `metadata` that actually participates in hashing
    /// and on-disk serialization (reserved fields excluded; spec §4.3
    /// "non-reserved metadata").
    pub fn custom_metadata(&self) -> MetadataMap {
        self.metadata
            .iter()
            .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Full metadata view returned to API callers: custom fields plus
    /// the reserved fields reflecting canonical struct state (spec §3).
    pub fn full_metadata(&self) -> MetadataMap {
        let mut full = self.custom_metadata();
        full.insert(
            "title".to_string(),
            MetadataValue::String(self.title.clone()),
        );
        full.insert(
            "type".to_string(),
            MetadataValue::String(self.note_type.clone()),
        );
        full.insert(
            "created".to_string(),
            MetadataValue::String(self.created.to_rfc3339()),
        );
        full.insert(
            "updated".to_string(),
            MetadataValue::String(self.updated.to_rfc3339()),
        );
        full.insert(
            "filename".to_string(),
            MetadataValue::String(self.filename.clone()),
        );
        full
    }
}

/// Parse a raw file's contents into a `(title, custom_metadata,
/// created, updated, body, warning?)` tuple ready to be folded into a
/// `Note` by the store, which already knows the id/type/slug/path from
/// the filename. `title` falls back to the slug (humanized) when the
/// front matter doesn't specify one.
pub struct ParsedFile {
    pub title: Option<String>,
    pub note_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub metadata: MetadataMap,
    pub body: String,
    pub warning: Option<String>,
}

pub fn parse_file(raw: &str) -> ParsedFile {
    match frontmatter::parse(raw) {
        ParseOutcome::Parsed { metadata, body } => {
            let mut custom = MetadataMap::new();
            let mut title = None;
            let mut note_type = None;
            let mut created = None;
            let mut updated = None;
            for (k, v) in metadata {
                match k.as_str() {
                    "title" => title = v.as_str().map(str::to_string),
                    "type" => note_type = v.as_str().map(str::to_string),
                    "created" => created = v.as_str().and_then(parse_timestamp),
                    "updated" => updated = v.as_str().and_then(parse_timestamp),
                    "filename" => {}
                    _ => {
                        custom.insert(k, v);
                    }
                }
            }
            ParsedFile {
                title,
                note_type,
                created,
                updated,
                metadata: custom,
                body,
                warning: None,
            }
        }
        ParseOutcome::Malformed { reason, body } => ParsedFile {
            title: None,
            note_type: None,
            created: None,
            updated: None,
            metadata: MetadataMap::new(),
            body,
            warning: Some(reason),
        },
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Validate a patch against the protected-field list (spec §4.4, §7).
/// Called before any metadata update is merged, on both single and
/// batched operations.
pub fn reject_protected_fields(patch: &MetadataMap) -> Result<()> {
    for field in PROTECTED_FIELDS {
        if patch.contains_key(field) {
            return Err(FlintError::protected_field(field));
        }
    }
    Ok(())
}

/// Shallow-merge an update patch into existing custom metadata: provided
/// keys replace, keys explicitly set to `null` are deleted, everything
/// else is untouched (spec §4.4).
pub fn merge_metadata(current: &mut MetadataMap, patch: MetadataMap) {
    for (k, v) in patch {
        if matches!(v, MetadataValue::Null) {
            current.shift_remove(&k);
        } else {
            current.insert(k, v);
        }
    }
}
