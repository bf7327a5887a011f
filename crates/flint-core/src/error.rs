//! Error types and exit codes for flint-note
//!
//! Exit codes (per §7 of the specification):
//! - 0: Success
//! - 1: Generic failure
//! - 2: Usage error (bad flags/args/query shape)
//! - 3: Data/store error (missing note, conflict, invalid frontmatter, ...)

use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes for flint-note operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    Usage = 2,
    Data = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<rusqlite::Error> for FlintError {
    fn from(err: rusqlite::Error) -> Self {
        FlintError::Io(format!("database error: {err}"))
    }
}

/// The error taxonomy described in spec §7.
#[derive(Error, Debug)]
pub enum FlintError {
    /// Entity missing (note, note type, workspace, ...).
    #[error("not found: {0}")]
    NotFound(String),

    /// id/slug collision on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Validator failed (name, identifier, query, duration format).
    #[error("invalid {context}: {reason}")]
    Invalid { context: String, reason: String },

    /// Attempt to set title/filename/type via the metadata-update path.
    #[error("cannot set protected field {field:?} via update_note; use {suggestion} instead")]
    ProtectedField { field: String, suggestion: String },

    /// Content-hash mismatch on an update/rename/move/delete.
    #[error("stale content hash for {id}: expected {expected}, got {actual}")]
    ConflictStale {
        id: String,
        expected: String,
        actual: String,
    },

    /// Regex compile failure or SQL validator rejection.
    #[error("bad query: {0}")]
    BadQuery(String),

    /// Metadata value fails the declared schema of the note type.
    #[error("schema violation on {note_id}.{field}: {reason}")]
    SchemaViolation {
        note_id: String,
        field: String,
        reason: String,
    },

    /// Filesystem or DB failure.
    #[error("io error: {0}")]
    Io(String),

    #[error("io error: {0}")]
    StdIo(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlintError {
    pub fn not_found(context: &str, value: impl std::fmt::Display) -> Self {
        FlintError::NotFound(format!("{context} {value}"))
    }

    pub fn already_exists(context: &str, value: impl std::fmt::Display) -> Self {
        FlintError::AlreadyExists(format!("{context} {value}"))
    }

    pub fn invalid(context: &str, reason: impl std::fmt::Display) -> Self {
        FlintError::Invalid {
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn protected_field(field: &str) -> Self {
        let suggestion = match field {
            "title" => "rename_note",
            "type" => "move_note",
            _ => "rename_note or move_note",
        };
        FlintError::ProtectedField {
            field: field.to_string(),
            suggestion: suggestion.to_string(),
        }
    }

    pub fn conflict_stale(id: &str, expected: &str, actual: &str) -> Self {
        FlintError::ConflictStale {
            id: id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn bad_query(reason: impl std::fmt::Display) -> Self {
        FlintError::BadQuery(reason.to_string())
    }

    pub fn io(operation: &str, path: &PathBuf, error: impl std::fmt::Display) -> Self {
        FlintError::Io(format!("failed to {operation} {}: {error}", path.display()))
    }

    /// The exit code a CLI should use when this error escapes to `main`.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FlintError::Invalid { .. } | FlintError::BadQuery(_) => ExitCode::Usage,

            FlintError::NotFound(_)
            | FlintError::AlreadyExists(_)
            | FlintError::ProtectedField { .. }
            | FlintError::ConflictStale { .. }
            | FlintError::SchemaViolation { .. } => ExitCode::Data,

            FlintError::Io(_) | FlintError::StdIo(_) | FlintError::Yaml(_) | FlintError::Json(_) => {
                ExitCode::Failure
            }
        }
    }

    /// Machine-readable `kind` string for the `{kind, message}` tool error payload (§6).
    pub fn kind(&self) -> &'static str {
        match self {
            FlintError::NotFound(_) => "NotFound",
            FlintError::AlreadyExists(_) => "AlreadyExists",
            FlintError::Invalid { .. } => "Invalid",
            FlintError::ProtectedField { .. } => "ProtectedField",
            FlintError::ConflictStale { .. } => "ConflictStale",
            FlintError::BadQuery(_) => "BadQuery",
            FlintError::SchemaViolation { .. } => "SchemaViolation",
            FlintError::Io(_) | FlintError::StdIo(_) | FlintError::Yaml(_) | FlintError::Json(_) => "IO",
        }
    }

    /// JSON error payload per §6: `{kind, message}` (plus a process exit code
    /// for the CLI's convenience).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }
}

pub type Result<T> = std::result::Result<T, FlintError>;
