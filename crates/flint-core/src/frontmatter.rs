//! Front-matter codec (C1): parse and serialize the YAML-like header that
//! precedes a note's Markdown body, preserving field order and scalar
//! typing exactly (spec §4.1). The teacher's `note::frontmatter` derives
//! a fixed `NoteFrontmatter` struct via `serde_yaml`; that approach can't
//! preserve the order of an open-ended, caller-defined key set, so this
//! module is a hand-rolled recursive-descent reader/writer over the
//! `MetadataMap`/`MetadataValue` model instead, in the spirit of the
//! bounds-scanning front-matter readers in `other_examples/` (e.g.
//! `XNote`'s `note_meta.rs`).

use crate::metadata::{LinkRef, MetadataMap, MetadataValue};

const DELIMITER: &str = "---";

/// Outcome of splitting+parsing a note file's raw contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Front matter parsed cleanly (or there was none at all).
    Parsed { metadata: MetadataMap, body: String },
    /// A `---` delimited block was present but did not parse as valid
    /// front matter. Per spec §4.1 the file remains readable as
    /// body-only: `body` is the *entire* original file content, metadata
    /// empty, and `reason` is surfaced as a warning by the caller.
    Malformed { reason: String, body: String },
}

/// Parse a note file's raw text into metadata + body.
pub fn parse(raw: &str) -> ParseOutcome {
    let Some(rest) = raw.strip_prefix(DELIMITER) else {
        return ParseOutcome::Parsed {
            metadata: MetadataMap::new(),
            body: raw.to_string(),
        };
    };
    // Require the opening delimiter to be alone on its line.
    let rest = match rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) {
        Some(r) => r,
        None => {
            return ParseOutcome::Parsed {
                metadata: MetadataMap::new(),
                body: raw.to_string(),
            }
        }
    };

    let Some((yaml_block, body)) = split_closing_delimiter(rest) else {
        return ParseOutcome::Malformed {
            reason: "unterminated front-matter block (no closing `---`)".to_string(),
            body: raw.to_string(),
        };
    };

    match parse_yaml_block(yaml_block) {
        Ok(metadata) => ParseOutcome::Parsed {
            metadata,
            body: body.to_string(),
        },
        Err(reason) => ParseOutcome::Malformed {
            reason,
            body: raw.to_string(),
        },
    }
}

/// Find the closing `---` line, returning `(yaml_text, body_after)`.
fn split_closing_delimiter(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == DELIMITER {
            let yaml_end = offset;
            let body_start = offset + line.len();
            return Some((&text[..yaml_end], &text[body_start..]));
        }
        offset += line.len();
    }
    None
}

/// Serialize a metadata map back into a `---`-delimited front-matter
/// block (without the trailing body). Caller-supplied key order is
/// preserved verbatim; composing reserved-first ordering for brand new
/// documents is the caller's job (see `note::assemble`).
pub fn serialize(metadata: &MetadataMap) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    write_mapping(&mut out, metadata, 0);
    out.push_str(DELIMITER);
    out.push('\n');
    out
}

// ---------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------

struct Lines<'a> {
    raw: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Lines {
            raw: text.lines().collect(),
            pos: 0,
        }
    }

    /// Skip blank/comment lines and report the indentation of the next
    /// significant line, without consuming it.
    fn peek_indent(&mut self) -> Option<usize> {
        while self.pos < self.raw.len() {
            let line = self.raw[self.pos];
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.pos += 1;
                continue;
            }
            return Some(line.len() - trimmed.len());
        }
        None
    }

    fn current(&self) -> &'a str {
        self.raw[self.pos]
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&mut self) -> bool {
        self.peek_indent().is_none()
    }
}

fn parse_yaml_block(text: &str) -> Result<MetadataMap, String> {
    let mut lines = Lines::new(text);
    if lines.at_end() {
        return Ok(MetadataMap::new());
    }
    let indent = lines.peek_indent().unwrap();
    parse_mapping(&mut lines, indent)
}

fn parse_mapping(lines: &mut Lines, indent: usize) -> Result<MetadataMap, String> {
    let mut map = MetadataMap::new();
    loop {
        let Some(cur_indent) = lines.peek_indent() else {
            break;
        };
        if cur_indent != indent {
            break;
        }
        let line = lines.current();
        let body = &line[indent..];
        if body.starts_with("- ") || body == "-" {
            return Err(format!("expected a mapping key, found a sequence item: {body:?}"));
        }
        let colon = find_key_colon(body)
            .ok_or_else(|| format!("missing `:` in front-matter line: {body:?}"))?;
        let key = body[..colon].trim();
        if key.is_empty() {
            return Err("empty front-matter key".to_string());
        }
        let key = unquote_key(key);
        let value_str = body[colon + 1..].trim();
        lines.advance();

        let value = if value_str.is_empty() {
            parse_block_value(lines, indent)?
        } else if let Some(style) = value_str.strip_prefix('|').or_else(|| value_str.strip_prefix('>')) {
            parse_block_scalar(lines, indent, style)
        } else if value_str.starts_with('[') {
            parse_inline_sequence(value_str)?
        } else if value_str.starts_with('{') {
            parse_inline_mapping(value_str)?
        } else {
            parse_scalar(value_str)
        };

        let value = if key == "links" {
            coerce_link_list(value)
        } else {
            value
        };
        map.insert(key, value);
    }
    Ok(map)
}

/// After a `key:` with nothing trailing, decide whether the nested block
/// is a sequence, a nested mapping, or (if dedented/EOF) a null scalar.
fn parse_block_value(lines: &mut Lines, parent_indent: usize) -> Result<MetadataValue, String> {
    let Some(next_indent) = lines.peek_indent() else {
        return Ok(MetadataValue::Null);
    };
    if next_indent <= parent_indent {
        return Ok(MetadataValue::Null);
    }
    let next_line = lines.current();
    let rest = &next_line[next_indent..];
    if rest.starts_with("- ") || rest == "-" {
        Ok(MetadataValue::List(parse_sequence(lines, next_indent)?))
    } else {
        Ok(MetadataValue::Map(parse_mapping(lines, next_indent)?))
    }
}

fn parse_sequence(lines: &mut Lines, indent: usize) -> Result<Vec<MetadataValue>, String> {
    let mut items = Vec::new();
    loop {
        let Some(cur_indent) = lines.peek_indent() else {
            break;
        };
        if cur_indent != indent {
            break;
        }
        let line = lines.current();
        let rest = &line[indent..];
        if !(rest.starts_with("- ") || rest == "-") {
            break;
        }
        let item_text = rest.strip_prefix("- ").unwrap_or("").trim();
        lines.advance();

        if item_text.is_empty() {
            // `-` alone: nested block indented under the dash.
            let Some(nested_indent) = lines.peek_indent() else {
                items.push(MetadataValue::Null);
                continue;
            };
            if nested_indent <= indent {
                items.push(MetadataValue::Null);
                continue;
            }
            let nested_line = lines.current();
            let nested_rest = &nested_line[nested_indent..];
            if nested_rest.starts_with("- ") {
                items.push(MetadataValue::List(parse_sequence(lines, nested_indent)?));
            } else {
                items.push(MetadataValue::Map(parse_mapping(lines, nested_indent)?));
            }
        } else if let Some(colon) = find_key_colon(item_text) {
            // `- key: value` starts an inline mapping item; remaining keys
            // of the same object are indented two past the dash.
            let first_key = unquote_key(item_text[..colon].trim());
            let first_val_str = item_text[colon + 1..].trim();
            let first_val = if first_val_str.is_empty() {
                parse_block_value(lines, indent)?
            } else {
                parse_scalar(first_val_str)
            };
            let mut obj = MetadataMap::new();
            obj.insert(first_key, first_val);
            let item_indent = indent + (rest.len() - item_text.len());
            if let Some(more_indent) = lines.peek_indent() {
                if more_indent == item_indent {
                    for (k, v) in parse_mapping(lines, item_indent)? {
                        obj.insert(k, v);
                    }
                }
            }
            items.push(MetadataValue::Map(obj));
        } else {
            items.push(parse_scalar(item_text));
        }
    }
    Ok(items)
}

/// Literal (`|`) or folded (`>`) block scalar. Chomping indicators
/// (`-`/`+`) are recognized but folded style is treated like literal
/// style (good enough for front-matter prose fields).
fn parse_block_scalar(lines: &mut Lines, parent_indent: usize, style_rest: &str) -> MetadataValue {
    let strip_trailing = style_rest.trim().starts_with('-');
    let mut collected: Vec<&str> = Vec::new();
    let mut block_indent: Option<usize> = None;
    while lines.pos < lines.raw.len() {
        let line = lines.raw[lines.pos];
        if line.trim().is_empty() {
            collected.push("");
            lines.pos += 1;
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent <= parent_indent {
            break;
        }
        let base = *block_indent.get_or_insert(indent);
        collected.push(&line[base.min(line.len())..]);
        lines.pos += 1;
    }
    while collected.last() == Some(&"") {
        collected.pop();
    }
    let mut text = collected.join("\n");
    if !strip_trailing && !text.is_empty() {
        text.push('\n');
    }
    MetadataValue::String(text)
}

fn parse_inline_sequence(s: &str) -> Result<MetadataValue, String> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("malformed inline array: {s:?}"))?;
    if inner.trim().is_empty() {
        return Ok(MetadataValue::List(Vec::new()));
    }
    let items = split_top_level(inner, ',')
        .into_iter()
        .map(|part| parse_scalar(part.trim()))
        .collect();
    Ok(MetadataValue::List(items))
}

fn parse_inline_mapping(s: &str) -> Result<MetadataValue, String> {
    let inner = s
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("malformed inline mapping: {s:?}"))?;
    let mut map = MetadataMap::new();
    if inner.trim().is_empty() {
        return Ok(MetadataValue::Map(map));
    }
    for part in split_top_level(inner, ',') {
        let colon = find_key_colon(part.trim())
            .ok_or_else(|| format!("missing `:` in inline mapping entry: {part:?}"))?;
        let key = unquote_key(part.trim()[..colon].trim());
        let value = parse_scalar(part.trim()[colon + 1..].trim());
        map.insert(key, value);
    }
    Ok(MetadataValue::Map(map))
}

/// Split on `sep` at bracket/quote depth zero.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => in_quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                c if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Locate the `:` that separates a mapping key from its value, ignoring
/// colons inside quoted strings.
fn find_key_colon(s: &str) -> Option<usize> {
    let mut in_quote: Option<char> = None;
    let bytes = s.as_bytes();
    for (i, c) in s.char_indices() {
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => continue,
            None => {
                if c == '\'' || c == '"' {
                    in_quote = Some(c);
                } else if c == ':' && (i + 1 == bytes.len() || bytes[i + 1] == b' ') {
                    return Some(i);
                }
            }
        }
    }
    None
}

fn unquote_key(key: &str) -> String {
    if (key.starts_with('"') && key.ends_with('"') && key.len() >= 2)
        || (key.starts_with('\'') && key.ends_with('\'') && key.len() >= 2)
    {
        key[1..key.len() - 1].to_string()
    } else {
        key.to_string()
    }
}

pub(crate) fn parse_scalar(raw: &str) -> MetadataValue {
    if raw.is_empty() {
        return MetadataValue::Null;
    }
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        return MetadataValue::String(unescape_double(&raw[1..raw.len() - 1]));
    }
    if raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2 {
        return MetadataValue::String(raw[1..raw.len() - 1].replace("''", "'"));
    }
    match raw {
        "true" | "True" | "TRUE" => return MetadataValue::Bool(true),
        "false" | "False" | "FALSE" => return MetadataValue::Bool(false),
        "null" | "Null" | "NULL" | "~" => return MetadataValue::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return MetadataValue::Number(n as f64);
    }
    if let Ok(n) = raw.parse::<f64>() {
        if raw.chars().any(|c| c.is_ascii_digit()) {
            return MetadataValue::Number(n);
        }
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        if let Ok(v) = parse_inline_sequence(raw) {
            return v;
        }
    }
    if raw.starts_with('{') && raw.ends_with('}') {
        if let Ok(v) = parse_inline_mapping(raw) {
            return v;
        }
    }
    MetadataValue::String(raw.to_string())
}

fn unescape_double(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `links: [...]` is stored as a reserved shape: a list of `{id,
/// link_type?}` maps coerces into a `LinkList`; anything else is left as
/// a plain `List` (the field is still just a metadata key like any
/// other).
fn coerce_link_list(value: MetadataValue) -> MetadataValue {
    let MetadataValue::List(items) = &value else {
        return value;
    };
    let mut refs = Vec::with_capacity(items.len());
    for item in items {
        let MetadataValue::Map(m) = item else {
            return value;
        };
        let Some(MetadataValue::String(id)) = m.get("id") else {
            return value;
        };
        let link_type = match m.get("link_type") {
            Some(MetadataValue::String(t)) => Some(t.clone()),
            _ => None,
        };
        refs.push(LinkRef {
            id: id.clone(),
            link_type,
        });
    }
    MetadataValue::LinkList(refs)
}

// ---------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------

fn write_mapping(out: &mut String, map: &MetadataMap, indent: usize) {
    let pad = " ".repeat(indent);
    for (key, value) in map {
        out.push_str(&pad);
        out.push_str(&serialize_key(key));
        out.push(':');
        write_value(out, value, indent);
    }
}

fn serialize_key(key: &str) -> String {
    if key.is_empty() || key.chars().any(|c| c == ':' || c == '#' || c.is_whitespace()) {
        format!("\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        key.to_string()
    }
}

fn write_value(out: &mut String, value: &MetadataValue, indent: usize) {
    match value {
        MetadataValue::String(s) if s.contains('\n') => {
            out.push_str(" |\n");
            let pad = " ".repeat(indent + 2);
            for line in s.trim_end_matches('\n').split('\n') {
                out.push_str(&pad);
                out.push_str(line);
                out.push('\n');
            }
        }
        MetadataValue::String(_) | MetadataValue::Number(_) | MetadataValue::Bool(_) | MetadataValue::Null => {
            out.push(' ');
            out.push_str(&serialize_scalar(value));
            out.push('\n');
        }
        MetadataValue::List(items) => {
            if items.is_empty() {
                out.push_str(" []\n");
                return;
            }
            out.push('\n');
            write_sequence(out, items, indent);
        }
        MetadataValue::Map(map) => {
            if map.is_empty() {
                out.push_str(" {}\n");
                return;
            }
            out.push('\n');
            write_mapping(out, map, indent + 2);
        }
        MetadataValue::LinkList(refs) => {
            if refs.is_empty() {
                out.push_str(" []\n");
                return;
            }
            out.push('\n');
            let pad = " ".repeat(indent);
            for link in refs {
                out.push_str(&pad);
                out.push_str("- id: ");
                out.push_str(&serialize_scalar(&MetadataValue::String(link.id.clone())));
                out.push('\n');
                if let Some(t) = &link.link_type {
                    out.push_str(&pad);
                    out.push_str("  link_type: ");
                    out.push_str(&serialize_scalar(&MetadataValue::String(t.clone())));
                    out.push('\n');
                }
            }
        }
    }
}

fn write_sequence(out: &mut String, items: &[MetadataValue], indent: usize) {
    let pad = " ".repeat(indent);
    for item in items {
        match item {
            MetadataValue::Map(map) if !map.is_empty() => {
                out.push_str(&pad);
                out.push_str("- ");
                let mut iter = map.iter();
                let (first_key, first_val) = iter.next().unwrap();
                out.push_str(&serialize_key(first_key));
                out.push(':');
                write_value(out, first_val, indent + 2);
                for (key, value) in iter {
                    out.push_str(&pad);
                    out.push_str("  ");
                    out.push_str(&serialize_key(key));
                    out.push(':');
                    write_value(out, value, indent + 2);
                }
            }
            _ => {
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&serialize_scalar(item));
                out.push('\n');
            }
        }
    }
}

fn serialize_scalar(value: &MetadataValue) -> String {
    match value {
        MetadataValue::Null => "null".to_string(),
        MetadataValue::Bool(b) => b.to_string(),
        MetadataValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        MetadataValue::String(s) => serialize_string_scalar(s),
        other => other.to_serialized(),
    }
}

fn serialize_string_scalar(s: &str) -> String {
    if needs_quoting(s) {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if s.trim() != s {
        return true;
    }
    if matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "null" | "~"
    ) {
        return true;
    }
    if s.parse::<f64>().is_ok() {
        return true;
    }
    let first = s.chars().next().unwrap();
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        return true;
    }
    if s.contains(": ") || s.ends_with(':') {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str, body: &str) -> String {
        format!("---\n{yaml}---\n{body}")
    }

    #[test]
    fn no_front_matter_is_body_only() {
        let outcome = parse("Just a plain note.\n");
        assert_eq!(
            outcome,
            ParseOutcome::Parsed {
                metadata: MetadataMap::new(),
                body: "Just a plain note.\n".to_string(),
            }
        );
    }

    #[test]
    fn scalars_round_trip() {
        let raw = doc(
            "title: Hello World\ncount: 3\nratio: 1.5\ndone: true\nempty: null\n",
            "Body text\n",
        );
        let ParseOutcome::Parsed { metadata, body } = parse(&raw) else {
            panic!("expected clean parse");
        };
        assert_eq!(body, "Body text\n");
        assert_eq!(metadata["title"], MetadataValue::String("Hello World".into()));
        assert_eq!(metadata["count"], MetadataValue::Number(3.0));
        assert_eq!(metadata["ratio"], MetadataValue::Number(1.5));
        assert_eq!(metadata["done"], MetadataValue::Bool(true));
        assert_eq!(metadata["empty"], MetadataValue::Null);
    }

    #[test]
    fn inline_array_and_block_sequence() {
        let raw = doc("tags: [a, b, c]\nauthors:\n  - Ann\n  - Bo\n", "body\n");
        let ParseOutcome::Parsed { metadata, .. } = parse(&raw) else {
            panic!("expected clean parse");
        };
        assert_eq!(
            metadata["tags"],
            MetadataValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            metadata["authors"],
            MetadataValue::List(vec!["Ann".into(), "Bo".into()])
        );
    }

    #[test]
    fn single_element_array_is_not_collapsed() {
        let raw = doc("tags: [solo]\n", "body\n");
        let ParseOutcome::Parsed { metadata, .. } = parse(&raw) else {
            panic!("expected clean parse");
        };
        assert_eq!(metadata["tags"], MetadataValue::List(vec!["solo".into()]));
    }

    #[test]
    fn nested_mapping() {
        let raw = doc(
            "project:\n  name: Flint\n  active: true\n",
            "body\n",
        );
        let ParseOutcome::Parsed { metadata, .. } = parse(&raw) else {
            panic!("expected clean parse");
        };
        let MetadataValue::Map(inner) = &metadata["project"] else {
            panic!("expected nested map");
        };
        assert_eq!(inner["name"], MetadataValue::String("Flint".into()));
        assert_eq!(inner["active"], MetadataValue::Bool(true));
    }

    #[test]
    fn block_scalar_multiline_string() {
        let raw = doc("summary: |\n  line one\n  line two\n", "body\n");
        let ParseOutcome::Parsed { metadata, .. } = parse(&raw) else {
            panic!("expected clean parse");
        };
        assert_eq!(
            metadata["summary"],
            MetadataValue::String("line one\nline two\n".to_string())
        );
    }

    #[test]
    fn unterminated_block_is_malformed_body_only() {
        let raw = "---\ntitle: Hello\nbody without closing delimiter\n";
        match parse(raw) {
            ParseOutcome::Malformed { body, .. } => assert_eq!(body, raw),
            ParseOutcome::Parsed { .. } => panic!("expected malformed"),
        }
    }

    #[test]
    fn parse_then_serialize_is_stable_for_a_fresh_document() {
        let mut map = MetadataMap::new();
        map.insert("title".to_string(), MetadataValue::String("Hello".into()));
        map.insert("tags".to_string(), MetadataValue::List(vec!["a".into()]));
        map.insert("count".to_string(), MetadataValue::Number(5.0));

        let rendered = serialize(&map);
        let full = format!("{rendered}body text\n");
        let ParseOutcome::Parsed { metadata, body } = parse(&full) else {
            panic!("expected clean parse");
        };
        assert_eq!(metadata, map);
        assert_eq!(body, "body text\n");
    }

    #[test]
    fn links_field_coerces_to_link_list() {
        let raw = doc(
            "links:\n  - id: general/other\n    link_type: reference\n  - id: general/plain\n",
            "body\n",
        );
        let ParseOutcome::Parsed { metadata, .. } = parse(&raw) else {
            panic!("expected clean parse");
        };
        let MetadataValue::LinkList(refs) = &metadata["links"] else {
            panic!("expected link list, got {:?}", metadata["links"]);
        };
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "general/other");
        assert_eq!(refs[0].link_type.as_deref(), Some("reference"));
        assert_eq!(refs[1].link_type, None);
    }
}
