//! JSON payload builders for the CLI's tool-surface output (spec §6:
//! "each tool returns a JSON payload or an error payload with
//! `{kind, message}`"). Grounded on the teacher's
//! `commands::json_builders` (manual `serde_json::json!` assembly over
//! domain structs that don't themselves derive `Serialize`).

use flint_core::db::links::{BrokenLinkGroup, ExternalLinkRow, InternalLinkRow};
use flint_core::metadata::{MetadataMap, MetadataValue};
use flint_core::note_type::NoteTypeInfo;
use flint_core::search::{AdvancedSearchResponse, SearchResult, SqlSearchOutcome};
use flint_core::sync::SyncOutcome;
use flint_core::workspace::{MutationReport, NoteLinks};
use flint_core::Note;

pub fn metadata_to_json(metadata: &MetadataMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::Value::Object(map)
}

pub fn note_to_json(note: &Note) -> serde_json::Value {
    serde_json::json!({
        "id": note.id,
        "type": note.note_type,
        "slug": note.slug,
        "title": note.title,
        "body": note.body,
        "filename": note.filename,
        "path": note.path.display().to_string(),
        "created": note.created.to_rfc3339(),
        "updated": note.updated.to_rfc3339(),
        "size": note.size,
        "content_hash": note.content_hash,
        "metadata": metadata_to_json(&note.metadata),
    })
}

pub fn search_result_to_json(result: &SearchResult) -> serde_json::Value {
    serde_json::json!({
        "id": result.id,
        "title": result.title,
        "type": result.note_type,
        "tags": result.tags,
        "score": result.score,
        "snippet": result.snippet,
        "created": result.created.to_rfc3339(),
        "updated": result.updated.to_rfc3339(),
        "filename": result.filename,
        "path": result.path,
        "size": result.size,
        "metadata": metadata_to_json(&result.metadata),
    })
}

pub fn search_results_to_json(results: &[SearchResult]) -> serde_json::Value {
    serde_json::Value::Array(results.iter().map(search_result_to_json).collect())
}

pub fn advanced_response_to_json(response: &AdvancedSearchResponse) -> serde_json::Value {
    serde_json::json!({
        "results": search_results_to_json(&response.results),
        "total": response.total,
        "has_more": response.has_more,
        "query_time_ms": response.query_time_ms,
    })
}

pub fn sql_outcome_to_json(outcome: &SqlSearchOutcome) -> serde_json::Value {
    match outcome {
        SqlSearchOutcome::Notes(results) => serde_json::json!({
            "kind": "notes",
            "results": search_results_to_json(results),
        }),
        SqlSearchOutcome::Aggregation(rows) => serde_json::json!({
            "kind": "aggregation",
            "rows": rows,
        }),
    }
}

pub fn note_type_info_to_json(info: &NoteTypeInfo) -> serde_json::Value {
    serde_json::json!({
        "name": info.name,
        "directory": info.directory.display().to_string(),
        "description": info.description,
        "note_count": info.note_count,
    })
}

pub fn note_type_infos_to_json(infos: &[NoteTypeInfo]) -> serde_json::Value {
    serde_json::Value::Array(infos.iter().map(note_type_info_to_json).collect())
}

fn internal_link_to_json(row: &InternalLinkRow) -> serde_json::Value {
    serde_json::json!({
        "source_id": row.source_id,
        "target_id": row.target_id,
        "target_title": row.target_title,
        "display": row.display,
        "position": row.position,
    })
}

fn external_link_to_json(row: &ExternalLinkRow) -> serde_json::Value {
    serde_json::json!({
        "source_id": row.source_id,
        "url": row.url,
        "label": row.label,
        "position": row.position,
    })
}

pub fn note_links_to_json(links: &NoteLinks) -> serde_json::Value {
    serde_json::json!({
        "outgoing_internal": links.outgoing_internal.iter().map(internal_link_to_json).collect::<Vec<_>>(),
        "outgoing_external": links.outgoing_external.iter().map(external_link_to_json).collect::<Vec<_>>(),
        "incoming_internal": links.incoming_internal.iter().map(internal_link_to_json).collect::<Vec<_>>(),
    })
}

fn broken_link_group_to_json(group: &BrokenLinkGroup) -> serde_json::Value {
    serde_json::json!({
        "target_title": group.target_title,
        "sources": group.sources,
    })
}

pub fn broken_links_to_json(groups: &[BrokenLinkGroup]) -> serde_json::Value {
    serde_json::Value::Array(groups.iter().map(broken_link_group_to_json).collect())
}

fn sync_outcome_to_json(outcome: &SyncOutcome) -> serde_json::Value {
    serde_json::json!({
        "resolved_incoming": outcome.resolved_incoming,
        "rewritten_incoming": outcome.rewritten_incoming,
    })
}

pub fn mutation_report_to_json(report: &MutationReport) -> serde_json::Value {
    serde_json::json!({
        "note": note_to_json(&report.note),
        "broken_links_resolved": report.sync.resolved_incoming,
        "rewritten_incoming": report.sync.rewritten_incoming,
    })
}

pub fn delete_outcome_to_json(outcome: &SyncOutcome) -> serde_json::Value {
    sync_outcome_to_json(outcome)
}

/// Parse a `--metadata` CLI argument (a JSON object) into a `MetadataMap`.
pub fn parse_metadata_json(raw: &str) -> Result<MetadataMap, String> {
    serde_json::from_str::<MetadataMap>(raw).map_err(|e| format!("invalid --metadata JSON: {e}"))
}

/// Parse a single `--param` value (used by `search-sql`) into a scalar
/// `MetadataValue`: JSON first (so `42`, `true`, `null`, `"text"` all
/// work), falling back to a bare string for unquoted text.
pub fn parse_sql_param(raw: &str) -> MetadataValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .map(json_scalar_to_metadata)
        .unwrap_or_else(|| MetadataValue::String(raw.to_string()))
}

fn json_scalar_to_metadata(value: serde_json::Value) -> MetadataValue {
    match value {
        serde_json::Value::String(s) => MetadataValue::String(s),
        serde_json::Value::Number(n) => MetadataValue::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::Bool(b) => MetadataValue::Bool(b),
        serde_json::Value::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}
