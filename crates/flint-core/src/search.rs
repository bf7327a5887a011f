//! Search engine (C8): simple text search (§4.8.1), advanced structured
//! search (§4.8.2), safe SQL search (§4.8.3), and tag/similarity queries
//! (§4.8.4). Grounded on the teacher's `commands::search` (FTS query
//! sanitization, snippet extraction) and `lib::index`'s tag/backlink
//! lookups, reshaped around this system's SQLite-backed index instead of
//! the teacher's JSON cache file.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};

use crate::db;
use crate::error::{FlintError, Result};
use crate::metadata::{MetadataMap, MetadataValue};

/// One result row shared by every search mode (spec §4.8.1's result
/// shape, reused by advanced/tag/similar queries).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub note_type: String,
    pub tags: Vec<String>,
    pub score: f64,
    pub snippet: Option<String>,
    pub created: chrono::DateTime<chrono::Utc>,
    pub updated: chrono::DateTime<chrono::Utc>,
    pub filename: String,
    pub path: String,
    pub size: i64,
    pub metadata: MetadataMap,
}

fn result_from_row(conn: &Connection, row: &db::notes::NoteRow, score: f64, snippet: Option<String>) -> Result<SearchResult> {
    let metadata = db::metadata::fetch(conn, &row.id)?;
    let tags = match metadata.get("tags") {
        Some(MetadataValue::List(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(MetadataValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    Ok(SearchResult {
        id: row.id.clone(),
        title: row.title.clone(),
        note_type: row.note_type.clone(),
        tags,
        score,
        snippet,
        created: row.created,
        updated: row.updated,
        filename: row.filename.clone(),
        path: row.path.clone(),
        size: row.size,
        metadata,
    })
}

fn clamp_limit(limit: i64) -> usize {
    limit.max(0) as usize
}

// ---------------------------------------------------------------------
// 4.8.1 Simple text search
// ---------------------------------------------------------------------

const FTS_REJECTED_CHARS: &[char] = &['(', ')', '@', '"', '\'', '-'];

/// `search_notes` (spec §4.8.1).
pub fn simple_search(
    conn: &Connection,
    query: &str,
    type_filter: Option<&str>,
    limit: i64,
    use_regex: bool,
) -> Result<Vec<SearchResult>> {
    let limit = clamp_limit(limit);
    if limit == 0 {
        return Ok(Vec::new());
    }

    if query.trim().is_empty() {
        return recent_notes(conn, type_filter, limit);
    }

    if use_regex {
        return regex_search(conn, query, type_filter, limit);
    }

    if query.chars().any(|c| FTS_REJECTED_CHARS.contains(&c)) {
        return like_fallback(conn, query, type_filter, limit);
    }

    fts_search(conn, query, type_filter, limit)
}

/// Boundary behavior: empty/whitespace query returns notes ordered by
/// `updated` desc, limited (spec §4.8.1 rule 1, §8 boundary behavior).
fn recent_notes(conn: &Connection, type_filter: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
    let sql = match type_filter {
        Some(_) => "SELECT * FROM notes WHERE type = ?1 ORDER BY updated DESC LIMIT ?2",
        None => "SELECT * FROM notes ORDER BY updated DESC LIMIT ?1",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<db::notes::NoteRow> = match type_filter {
        Some(t) => collect_note_rows(stmt.query_map(rusqlite::params![t, limit as i64], db::notes::row_to_note)?)?,
        None => collect_note_rows(stmt.query_map(rusqlite::params![limit as i64], db::notes::row_to_note)?)?,
    };
    rows.into_iter().map(|r| result_from_row(conn, &r, 1.0, None)).collect()
}

fn regex_search(conn: &Connection, pattern: &str, type_filter: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
    let re = Regex::new(&format!("(?i){pattern}")).map_err(|e| FlintError::bad_query(format!("invalid regex: {e}")))?;

    let sql = match type_filter {
        Some(_) => "SELECT * FROM notes WHERE type = ?1",
        None => "SELECT * FROM notes",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<db::notes::NoteRow> = match type_filter {
        Some(t) => collect_note_rows(stmt.query_map(rusqlite::params![t], db::notes::row_to_note)?)?,
        None => collect_note_rows(stmt.query_map([], db::notes::row_to_note)?)?,
    };

    let mut out = Vec::new();
    for row in rows {
        if out.len() >= limit {
            break;
        }
        let haystack = format!("{}\n{}", row.title, row.content);
        if re.is_match(&haystack) {
            out.push(result_from_row(conn, &row, 1.0, None)?);
        }
    }
    Ok(out)
}

fn fts_search(conn: &Connection, query: &str, type_filter: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
    let sanitized = if query.ends_with('*') || query.chars().count() < 3 {
        query.to_string()
    } else {
        format!("{query}*")
    };

    let sql = match type_filter {
        Some(_) => {
            "SELECT n.*, nf.rank AS r, snippet(notes_fts, 2, '<mark>', '</mark>', '...', 32) AS snip
             FROM notes_fts nf JOIN notes n ON n.id = nf.id
             WHERE nf MATCH ?1 AND n.type = ?2 ORDER BY r LIMIT ?3"
        }
        None => {
            "SELECT n.*, nf.rank AS r, snippet(notes_fts, 2, '<mark>', '</mark>', '...', 32) AS snip
             FROM notes_fts nf JOIN notes n ON n.id = nf.id
             WHERE nf MATCH ?1 ORDER BY r LIMIT ?2"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let mapper = |r: &rusqlite::Row| -> rusqlite::Result<(db::notes::NoteRow, f64, Option<String>)> {
        let row = db::notes::row_to_note(r)?;
        let rank: f64 = r.get("r")?;
        let snip: Option<String> = r.get("snip")?;
        Ok((row, rank, snip))
    };
    let rows: Vec<(db::notes::NoteRow, f64, Option<String>)> = match type_filter {
        Some(t) => collect(stmt.query_map(rusqlite::params![sanitized, t, limit as i64], mapper)?)?,
        None => collect(stmt.query_map(rusqlite::params![sanitized, limit as i64], mapper)?)?,
    };
    rows.into_iter()
        .map(|(row, rank, snip)| result_from_row(conn, &row, -rank, snip))
        .collect()
}

/// Fallback when the query contains FTS-dangerous characters (spec
/// §4.8.1 rule 4, §8 boundary behavior).
fn like_fallback(conn: &Connection, query: &str, type_filter: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
    let pattern = format!("%{query}%");
    let sql = match type_filter {
        Some(_) => {
            "SELECT * FROM notes WHERE (title LIKE ?1 OR content LIKE ?1) AND type = ?2
             ORDER BY updated DESC LIMIT ?3"
        }
        None => "SELECT * FROM notes WHERE (title LIKE ?1 OR content LIKE ?1) ORDER BY updated DESC LIMIT ?2",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<db::notes::NoteRow> = match type_filter {
        Some(t) => collect_note_rows(stmt.query_map(rusqlite::params![pattern, t, limit as i64], db::notes::row_to_note)?)?,
        None => collect_note_rows(stmt.query_map(rusqlite::params![pattern, limit as i64], db::notes::row_to_note)?)?,
    };
    rows.into_iter().map(|r| result_from_row(conn, &r, 1.0, None)).collect()
}

fn collect_note_rows(
    rows: rusqlite::MappedRows<impl FnMut(&rusqlite::Row) -> rusqlite::Result<db::notes::NoteRow>>,
) -> Result<Vec<db::notes::NoteRow>> {
    collect(rows)
}

fn collect<T>(rows: rusqlite::MappedRows<impl FnMut(&rusqlite::Row) -> rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// 4.8.2 Advanced structured search
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    In,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
    pub operator: FilterOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Type,
    Created,
    Updated,
    Size,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Type => "type",
            SortField::Created => "created",
            SortField::Updated => "updated",
            SortField::Size => "size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct AdvancedSearchParams {
    pub note_type: Option<String>,
    pub metadata_filters: Vec<MetadataFilter>,
    pub updated_within: Option<String>,
    pub updated_before: Option<String>,
    pub created_within: Option<String>,
    pub created_before: Option<String>,
    pub content_contains: Option<String>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedSearchResponse {
    pub results: Vec<SearchResult>,
    pub total: i64,
    pub has_more: bool,
    pub query_time_ms: u64,
}

/// Parse a duration string of the form `\d+[dwmy]` into a number of days
/// (spec §4.8.2, §8: "Duration strings outside `\d+[dwmy]` return `Invalid`").
fn parse_duration_days(s: &str) -> Result<i64> {
    let re = Regex::new(r"^(\d+)([dwmy])$").expect("static duration pattern is valid");
    let caps = re
        .captures(s)
        .ok_or_else(|| FlintError::invalid("duration", format!("{s:?} must match \\d+[dwmy]")))?;
    let n: i64 = caps[1].parse().unwrap_or(0);
    let days = match &caps[2] {
        "d" => n,
        "w" => n * 7,
        "m" => n * 30,
        "y" => n * 365,
        _ => unreachable!(),
    };
    Ok(days)
}

/// `note_metadata.value` is always the JSON-serialized form a
/// `MetadataValue` writes via `to_serialized()` (`metadata.rs`) — a
/// string is stored quoted, a number unquoted. Filter values arrive as
/// plain CLI/tool-surface text (`status=draft` → `"draft"`), so an
/// equality/membership comparison must first reparse the raw text the
/// same way the front-matter codec parses a bare scalar, then
/// re-serialize it, to land on the same stored form.
fn normalized_filter_value(raw: &str) -> String {
    crate::frontmatter::parse_scalar(raw).to_serialized()
}

struct AdvancedQuery {
    sql: String,
    count_sql: String,
    binds: Vec<SqlValue>,
}

fn build_advanced_query(params: &AdvancedSearchParams) -> Result<AdvancedQuery> {
    let mut joins = String::new();
    let mut wheres: Vec<String> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();

    if let Some(t) = &params.note_type {
        wheres.push("n.type = ?".to_string());
        binds.push(SqlValue::Text(t.clone()));
    }

    for (i, filter) in params.metadata_filters.iter().enumerate() {
        let alias = format!("m{i}");
        joins.push_str(&format!(" JOIN note_metadata {alias} ON {alias}.note_id = n.id AND {alias}.key = ?"));
        binds.push(SqlValue::Text(filter.key.clone()));

        match filter.operator {
            FilterOp::In => {
                let values: Vec<&str> = filter.value.split(',').map(str::trim).collect();
                let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                wheres.push(format!("{alias}.value IN ({placeholders})"));
                for v in values {
                    binds.push(SqlValue::Text(normalized_filter_value(v)));
                }
            }
            FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
                // note_metadata.value is JSON text; comparing it lexically would
                // order "10.0" before "9.0". Cast both sides to REAL instead.
                let n: f64 = filter.value.trim().parse().map_err(|_| {
                    FlintError::invalid("metadata_filters", format!("{:?} is not a number", filter.value))
                })?;
                wheres.push(format!("CAST({alias}.value AS REAL) {} ?", filter.operator.sql()));
                binds.push(SqlValue::Real(n));
            }
            FilterOp::Like => {
                // Substring match: the surrounding JSON quotes on a stored
                // string value don't affect whether the pattern matches inside
                // them, so the raw pattern is used unnormalized.
                wheres.push(format!("{alias}.value LIKE ?"));
                binds.push(SqlValue::Text(filter.value.clone()));
            }
            FilterOp::Eq | FilterOp::Neq => {
                wheres.push(format!("{alias}.value {} ?", filter.operator.sql()));
                binds.push(SqlValue::Text(normalized_filter_value(&filter.value)));
            }
        }
    }

    if let Some(content) = &params.content_contains {
        joins.push_str(" JOIN notes_fts nfts ON nfts.id = n.id");
        wheres.push("nfts MATCH ?".to_string());
        binds.push(SqlValue::Text(content.clone()));
    }

    let now = chrono::Utc::now();
    if let Some(s) = &params.updated_within {
        let threshold = now - chrono::Duration::days(parse_duration_days(s)?);
        wheres.push("n.updated >= ?".to_string());
        binds.push(SqlValue::Text(threshold.to_rfc3339()));
    }
    if let Some(s) = &params.updated_before {
        let threshold = now - chrono::Duration::days(parse_duration_days(s)?);
        wheres.push("n.updated <= ?".to_string());
        binds.push(SqlValue::Text(threshold.to_rfc3339()));
    }
    if let Some(s) = &params.created_within {
        let threshold = now - chrono::Duration::days(parse_duration_days(s)?);
        wheres.push("n.created >= ?".to_string());
        binds.push(SqlValue::Text(threshold.to_rfc3339()));
    }
    if let Some(s) = &params.created_before {
        let threshold = now - chrono::Duration::days(parse_duration_days(s)?);
        wheres.push("n.created <= ?".to_string());
        binds.push(SqlValue::Text(threshold.to_rfc3339()));
    }

    let where_clause = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };

    let order_by = if params.sort.is_empty() {
        " ORDER BY n.updated DESC".to_string()
    } else {
        let parts: Vec<String> = params
            .sort
            .iter()
            .map(|s| format!("n.{} {}", s.field.column(), if s.order == SortOrder::Desc { "DESC" } else { "ASC" }))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };

    let count_sql = format!("SELECT COUNT(DISTINCT n.id) FROM notes n{joins}{where_clause}");
    let sql = format!("SELECT DISTINCT n.* FROM notes n{joins}{where_clause}{order_by} LIMIT ? OFFSET ?");

    Ok(AdvancedQuery { sql, count_sql, binds })
}

/// `search_notes_advanced` (spec §4.8.2).
pub fn advanced_search(conn: &Connection, params: &AdvancedSearchParams) -> Result<AdvancedSearchResponse> {
    let start = Instant::now();
    let limit = clamp_limit(params.limit.unwrap_or(50)) as i64;
    let offset = params.offset.unwrap_or(0).max(0);

    let query = build_advanced_query(params)?;

    let total: i64 = conn.query_row(&query.count_sql, params_from_iter(query.binds.iter()), |r| r.get(0))?;

    let mut full_binds = query.binds.clone();
    full_binds.push(SqlValue::Integer(limit));
    full_binds.push(SqlValue::Integer(offset));

    let mut stmt = conn.prepare(&query.sql)?;
    let rows: Vec<db::notes::NoteRow> = collect(stmt.query_map(params_from_iter(full_binds.iter()), db::notes::row_to_note)?)?;

    let results: Vec<SearchResult> = rows
        .into_iter()
        .map(|r| result_from_row(conn, &r, 1.0, None))
        .collect::<Result<_>>()?;

    let has_more = offset + (results.len() as i64) < total;

    Ok(AdvancedSearchResponse {
        results,
        total,
        has_more,
        query_time_ms: start.elapsed().as_millis() as u64,
    })
}

// ---------------------------------------------------------------------
// 4.8.3 Safe SQL search
// ---------------------------------------------------------------------

const PROHIBITED_KEYWORDS: &[&str] = &[
    "drop", "delete", "insert", "update", "alter", "create", "attach", "detach", "grant", "revoke",
    "commit", "rollback", "truncate", "replace", "exec", "execute", "pragma",
];
const PROHIBITED_TABLES: &[&str] = &["sqlite_master", "sqlite_sequence", "sqlite_stat1"];
const AGGREGATE_FUNCS: &[&str] = &["count", "sum", "avg", "min", "max", "group_concat", "total"];

fn word_count(haystack: &str, word: &str) -> usize {
    let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).expect("static word pattern is valid");
    re.find_iter(haystack).count()
}

/// Validation pipeline (spec §4.8.3): reject on any failure.
pub fn validate_sql(query: &str) -> Result<()> {
    let trimmed = query.trim();
    if !trimmed.to_ascii_lowercase().starts_with("select") {
        return Err(FlintError::bad_query("Only SELECT queries are allowed"));
    }
    for kw in PROHIBITED_KEYWORDS {
        if word_count(trimmed, kw) > 0 {
            return Err(FlintError::bad_query(format!("prohibited keyword: {kw}")));
        }
    }
    for table in PROHIBITED_TABLES {
        if trimmed.to_ascii_lowercase().contains(table) {
            return Err(FlintError::bad_query(format!("prohibited table: {table}")));
        }
    }
    if word_count(trimmed, "select") > 3 {
        return Err(FlintError::bad_query("too many nested SELECT statements (max 3)"));
    }
    if word_count(trimmed, "join") > 5 {
        return Err(FlintError::bad_query("too many JOINs (max 5)"));
    }
    if trimmed.contains("--") || trimmed.contains("/*") {
        return Err(FlintError::bad_query("comments are not allowed in queries"));
    }
    Ok(())
}

/// Aggregation iff the query contains an aggregate function call or
/// `GROUP BY` (spec §9, Open Question 2: a bare `SELECT * FROM notes` is
/// never aggregation regardless of its leading `*`).
pub fn is_aggregation_query(query: &str) -> bool {
    let lower = query.to_ascii_lowercase();
    if Regex::new(r"(?i)\bgroup\s+by\b").unwrap().is_match(&lower) {
        return true;
    }
    AGGREGATE_FUNCS.iter().any(|f| {
        Regex::new(&format!(r"(?i)\b{f}\s*\(")).expect("static aggregate pattern is valid").is_match(&lower)
    })
}

fn has_limit_clause(query: &str) -> bool {
    Regex::new(r"(?i)\blimit\b").unwrap().is_match(query)
}

pub enum SqlSearchOutcome {
    Notes(Vec<SearchResult>),
    Aggregation(Vec<serde_json::Value>),
}

pub struct SqlSearchParams<'a> {
    pub query: &'a str,
    pub params: Vec<MetadataValue>,
    pub limit: Option<i64>,
    pub timeout_ms: Option<u64>,
}

/// `search_notes_sql` (spec §4.8.3).
pub fn sql_search(conn: &Connection, request: SqlSearchParams) -> Result<SqlSearchOutcome> {
    validate_sql(request.query)?;

    let timeout = request.timeout_ms.unwrap_or(30_000);
    conn.busy_timeout(Duration::from_millis(timeout))?;

    let limit = request.limit.unwrap_or(1000).max(0);
    let final_sql = if has_limit_clause(request.query) {
        request.query.to_string()
    } else {
        format!("{} LIMIT {}", request.query.trim_end_matches(';'), limit)
    };

    let binds: Vec<SqlValue> = request
        .params
        .iter()
        .map(|v| match v {
            MetadataValue::String(s) => SqlValue::Text(s.clone()),
            MetadataValue::Number(n) => SqlValue::Real(*n),
            MetadataValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
            MetadataValue::Null => SqlValue::Null,
            other => SqlValue::Text(other.to_serialized()),
        })
        .collect();

    let aggregation = is_aggregation_query(request.query);

    let mut stmt = conn.prepare(&final_sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    if aggregation {
        let rows = stmt.query_map(params_from_iter(binds.iter()), move |row| row_to_json(row, &column_names))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        return Ok(SqlSearchOutcome::Aggregation(out));
    }

    let has_id_column = column_names.iter().any(|c| c == "id");
    if !has_id_column {
        let rows = stmt.query_map(params_from_iter(binds.iter()), move |row| row_to_json(row, &column_names))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        return Ok(SqlSearchOutcome::Aggregation(out));
    }

    let id_idx = column_names.iter().position(|c| c == "id").unwrap();
    let ids: Vec<String> = {
        let rows = stmt.query_map(params_from_iter(binds.iter()), move |row| row.get::<_, String>(id_idx))?;
        collect(rows)?
    };

    let mut results = Vec::new();
    for id in ids {
        if let Some(row) = db::notes::get(conn, &id)? {
            results.push(result_from_row(conn, &row, 1.0, None)?);
        }
    }
    Ok(SqlSearchOutcome::Notes(results))
}

fn row_to_json(row: &rusqlite::Row, columns: &[String]) -> rusqlite::Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Integer(n) => serde_json::Value::from(n),
            ValueRef::Real(f) => serde_json::json!(f),
            ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
        };
        map.insert(name.clone(), value);
    }
    Ok(serde_json::Value::Object(map))
}

// ---------------------------------------------------------------------
// 4.8.4 Tag queries and similar-notes
// ---------------------------------------------------------------------

/// `by_tags` (spec §4.8.4).
pub fn by_tags(conn: &Connection, tags: &[String], require_all: bool) -> Result<Vec<SearchResult>> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in tags {
        let mut stmt = conn.prepare(
            "SELECT note_id FROM note_metadata WHERE key = 'tags' AND (value LIKE ?1 OR value = ?2)",
        )?;
        let like = format!("%\"{tag}\"%");
        let exact = format!("\"{tag}\"");
        let rows = stmt.query_map(rusqlite::params![like, exact], |r| r.get::<_, String>(0))?;
        for id in rows {
            *counts.entry(id?).or_insert(0) += 1;
        }
    }
    let threshold = if require_all { tags.len() } else { 1 };
    let mut ids: Vec<&String> = counts.iter().filter(|(_, c)| **c >= threshold).map(|(id, _)| id).collect();
    ids.sort();

    let mut results = Vec::new();
    for id in ids {
        if let Some(row) = db::notes::get(conn, id)? {
            results.push(result_from_row(conn, &row, 1.0, None)?);
        }
    }
    results.sort_by(|a, b| b.updated.cmp(&a.updated));
    Ok(results)
}

/// `similar` (spec §4.8.4): title+tags+high-weight tokens as the FTS
/// query, excluding the note itself, normalized score in `[0, 1]`.
pub fn similar(conn: &Connection, id: &str, k: usize) -> Result<Vec<SearchResult>> {
    let note = db::notes::get(conn, id)?.ok_or_else(|| FlintError::not_found("note", id))?;
    let tags_blob = db::metadata::tags_blob(&db::metadata::fetch(conn, id)?);

    let mut tokens: Vec<&str> = note.title.split_whitespace().collect();
    tokens.extend(tags_blob.split_whitespace());
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let fts_query = tokens.join(" OR ");

    let mut stmt = conn.prepare(
        "SELECT n.*, nf.rank AS r FROM notes_fts nf JOIN notes n ON n.id = nf.id
         WHERE nf MATCH ?1 AND n.id != ?2 ORDER BY r LIMIT ?3",
    )?;
    let mapper = |r: &rusqlite::Row| -> rusqlite::Result<(db::notes::NoteRow, f64)> {
        Ok((db::notes::row_to_note(r)?, r.get("r")?))
    };
    let rows: Vec<(db::notes::NoteRow, f64)> = collect(stmt.query_map(rusqlite::params![fts_query, id, k as i64], mapper)?)?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let max_rank = rows.iter().map(|(_, r)| r.abs()).fold(0.0_f64, f64::max).max(1.0);

    rows.into_iter()
        .map(|(row, rank)| {
            let normalized = (rank.abs() / max_rank).clamp(0.0, 1.0);
            result_from_row(conn, &row, normalized, None)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::indexer;
    use crate::note::Note;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample(id: &str, title: &str, body: &str) -> Note {
        Note {
            id: id.to_string(),
            note_type: id.split('/').next().unwrap().to_string(),
            slug: id.split('/').next_back().unwrap().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            filename: format!("{}.md", id.split('/').next_back().unwrap()),
            path: PathBuf::from(format!("/vault/{id}.md")),
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
            size: body.len() as u64,
            content_hash: "hash".to_string(),
            metadata: MetadataMap::new(),
        }
    }

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let (db, _) = Database::open(&dir.path().join("search.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn fts_prefix_match_finds_programming_guide_not_cooking() {
        let (_dir, db) = open_db();
        let a = sample("general/programming-guide", "Programming Guide", "Learning Python programming");
        let b = sample("general/cooking", "Cooking", "Italian cooking");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let results = simple_search(db.reader(), "prog", None, 10, false).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "general/programming-guide");
        assert!(results[0].snippet.as_deref().unwrap().contains("<mark>"));
    }

    #[test]
    fn regex_search_finds_matching_note_and_rejects_bad_pattern() {
        let (_dir, db) = open_db();
        let a = sample("general/a", "A", "test123 and test456");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();

        let results = simple_search(db.reader(), r"test\d+", None, 10, true).unwrap();
        assert_eq!(results.len(), 1);

        let err = simple_search(db.reader(), "[bad", None, 10, true).unwrap_err();
        assert!(matches!(err, FlintError::BadQuery(_)));
    }

    #[test]
    fn empty_query_returns_all_notes_sorted_by_updated_desc() {
        let (_dir, db) = open_db();
        let a = sample("general/a", "A", "x");
        let b = sample("general/b", "B", "y");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let results = simple_search(db.reader(), "", None, 10, false).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn dangerous_characters_fall_through_to_like() {
        let (_dir, db) = open_db();
        let a = sample("general/a", "A", "contains a dash-like-word here");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        let results = simple_search(db.reader(), "dash-like", None, 10, false).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn limit_zero_returns_empty() {
        let (_dir, db) = open_db();
        let a = sample("general/a", "A", "x");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        assert!(simple_search(db.reader(), "x", None, 0, false).unwrap().is_empty());
        assert!(simple_search(db.reader(), "x", None, -5, false).unwrap().is_empty());
    }

    #[test]
    fn advanced_filter_matches_recent_draft_only() {
        let (_dir, db) = open_db();
        let now = chrono::Utc::now();
        let mut a = sample("general/a", "A", "x");
        a.metadata.insert("status".to_string(), "draft".into());
        a.updated = now;
        let mut b = sample("general/b", "B", "y");
        b.metadata.insert("status".to_string(), "published".into());
        b.updated = now;
        let mut c = sample("general/c", "C", "z");
        c.metadata.insert("status".to_string(), "draft".into());
        c.updated = now - chrono::Duration::days(10);

        for note in [&a, &b, &c] {
            indexer::upsert(db.writer(), note, &Default::default(), &Default::default()).unwrap();
        }

        let params = AdvancedSearchParams {
            metadata_filters: vec![MetadataFilter {
                key: "status".to_string(),
                value: "draft".to_string(),
                operator: FilterOp::Eq,
            }],
            updated_within: Some("7d".to_string()),
            sort: vec![SortSpec { field: SortField::Updated, order: SortOrder::Desc }],
            ..Default::default()
        };
        let response = advanced_search(db.reader(), &params).unwrap();
        assert_eq!(response.total, 1);
        assert!(!response.has_more);
        assert_eq!(response.results[0].id, "general/a");
    }

    #[test]
    fn advanced_numeric_filter_compares_by_value_not_lexically() {
        let (_dir, db) = open_db();
        let mut a = sample("general/a", "A", "x");
        a.metadata.insert("views".to_string(), MetadataValue::Number(9.0));
        let mut b = sample("general/b", "B", "y");
        b.metadata.insert("views".to_string(), MetadataValue::Number(10.0));

        for note in [&a, &b] {
            indexer::upsert(db.writer(), note, &Default::default(), &Default::default()).unwrap();
        }

        // Lexically "10.0" < "9.0", so a naive text comparison would miss `b`.
        let params = AdvancedSearchParams {
            metadata_filters: vec![MetadataFilter {
                key: "views".to_string(),
                value: "9".to_string(),
                operator: FilterOp::Gt,
            }],
            ..Default::default()
        };
        let response = advanced_search(db.reader(), &params).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.results[0].id, "general/b");
    }

    #[test]
    fn duration_parser_rejects_bad_format() {
        assert!(parse_duration_days("7d").is_ok());
        assert!(parse_duration_days("sevendays").is_err());
        assert!(parse_duration_days("7").is_err());
    }

    #[test]
    fn safe_sql_rejects_writes_and_runs_aggregation() {
        let (_dir, db) = open_db();
        let a = sample("general/a", "A", "x");
        let b = sample("projects/b", "B", "y");
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let err = validate_sql("DELETE FROM notes").unwrap_err();
        assert!(err.to_string().contains("Only SELECT"));

        let outcome = sql_search(
            db.reader(),
            SqlSearchParams {
                query: "SELECT type, COUNT(*) c FROM notes GROUP BY type",
                params: Vec::new(),
                limit: None,
                timeout_ms: None,
            },
        )
        .unwrap();
        match outcome {
            SqlSearchOutcome::Aggregation(rows) => assert_eq!(rows.len(), 2),
            SqlSearchOutcome::Notes(_) => panic!("expected aggregation rows"),
        }
    }

    #[test]
    fn sql_validator_caps_subqueries_and_joins() {
        let many_selects = "select * from (select * from (select * from (select * from notes)))";
        assert!(validate_sql(many_selects).is_err());

        let many_joins = "select * from notes n join note_metadata m1 on 1=1 join note_metadata m2 on 1=1 \
             join note_metadata m3 on 1=1 join note_metadata m4 on 1=1 join note_metadata m5 on 1=1 \
             join note_metadata m6 on 1=1";
        assert!(validate_sql(many_joins).is_err());
    }

    #[test]
    fn by_tags_union_and_intersection() {
        let (_dir, db) = open_db();
        let mut a = sample("general/a", "A", "x");
        a.metadata.insert("tags".to_string(), MetadataValue::List(vec!["rust".into(), "search".into()]));
        let mut b = sample("general/b", "B", "y");
        b.metadata.insert("tags".to_string(), MetadataValue::List(vec!["rust".into()]));
        indexer::upsert(db.writer(), &a, &Default::default(), &Default::default()).unwrap();
        indexer::upsert(db.writer(), &b, &Default::default(), &Default::default()).unwrap();

        let union = by_tags(db.reader(), &["rust".to_string(), "search".to_string()], false).unwrap();
        assert_eq!(union.len(), 2);

        let intersection = by_tags(db.reader(), &["rust".to_string(), "search".to_string()], true).unwrap();
        assert_eq!(intersection.len(), 1);
        assert_eq!(intersection[0].id, "general/a");
    }
}
