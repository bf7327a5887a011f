//! Link extractor (C5): recognizes internal wiki-style references and
//! external URLs/Markdown links in a note body. Grounded on the
//! teacher's `index::links::extract_links`, which threads a known-id set
//! through extraction so inline links resolve in the same pass; this
//! module keeps that shape but splits pure syntactic extraction from
//! resolution so the indexer (C7) and synchronizer (C9) can resolve
//! against whatever id/title set is current at call time.

use std::collections::{HashMap, HashSet};

use regex::Regex;

/// A `[[target]]` or `[[target|display]]` occurrence before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalRef {
    pub target_text: String,
    pub display: String,
    pub position: usize,
}

/// A captured external reference: bare URL, Markdown link, or image.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRef {
    pub url: String,
    pub label: Option<String>,
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLinks {
    pub internal: Vec<InternalRef>,
    pub external: Vec<ExternalRef>,
}

/// A resolved (or broken) internal link, ready to become an
/// `internal_links` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInternalLink {
    pub target_text: String,
    pub target_note_id: Option<String>,
    pub target_title: String,
    pub display: String,
    pub position: usize,
}

fn wiki_link_re() -> Regex {
    Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("static wiki-link pattern is valid")
}

fn markdown_link_re() -> Regex {
    Regex::new(r"!?\[([^\]]*)\]\(([^)]+)\)").expect("static markdown-link pattern is valid")
}

fn bare_url_re() -> Regex {
    Regex::new(r"(?:https?://|www\.)[^\s)\]<>]+").expect("static bare-url pattern is valid")
}

/// Extract every internal and external reference from `body`. Patterns
/// are evaluated independently and are **not** deduplicated against each
/// other: a bare URL that also sits inside `[label](url)` produces two
/// rows, one per pattern, each at its own position (spec §4.5).
pub fn extract(body: &str) -> ExtractedLinks {
    let mut internal = Vec::new();
    for cap in wiki_link_re().captures_iter(body) {
        let target = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if target.is_empty() {
            continue;
        }
        let display = cap
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| target.to_string());
        internal.push(InternalRef {
            target_text: target.to_string(),
            display,
            position: cap.get(0).unwrap().start(),
        });
    }

    let mut external = Vec::new();
    for cap in markdown_link_re().captures_iter(body) {
        let url = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if url.is_empty() {
            continue;
        }
        let label = cap.get(1).map(|m| m.as_str().trim().to_string());
        external.push(ExternalRef {
            url: url.to_string(),
            label: label.filter(|l| !l.is_empty()),
            position: cap.get(0).unwrap().start(),
        });
    }
    for cap in bare_url_re().captures_iter(body) {
        let m = cap.get(0).unwrap();
        external.push(ExternalRef {
            url: m.as_str().trim_end_matches(['.', ',', ')']).to_string(),
            label: None,
            position: m.start(),
        });
    }

    ExtractedLinks { internal, external }
}

/// Resolve extracted internal refs against a known-id set and a
/// title→id map, in that priority order (spec §4.5): exact id match
/// first, then exact (case-sensitive) title match, else broken.
pub fn resolve_internal(
    refs: &[InternalRef],
    known_ids: &HashSet<String>,
    title_to_id: &HashMap<String, String>,
) -> Vec<ResolvedInternalLink> {
    refs.iter()
        .map(|r| {
            let target_note_id = if known_ids.contains(&r.target_text) {
                Some(r.target_text.clone())
            } else {
                title_to_id.get(&r.target_text).cloned()
            };
            ResolvedInternalLink {
                target_text: r.target_text.clone(),
                target_note_id,
                target_title: r.target_text.clone(),
                display: r.display.clone(),
                position: r.position,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiki_links_with_and_without_display() {
        let body = "See [[general/other]] and [[general/third|Third Note]].";
        let extracted = extract(body);
        assert_eq!(extracted.internal.len(), 2);
        assert_eq!(extracted.internal[0].target_text, "general/other");
        assert_eq!(extracted.internal[0].display, "general/other");
        assert_eq!(extracted.internal[1].target_text, "general/third");
        assert_eq!(extracted.internal[1].display, "Third Note");
    }

    #[test]
    fn markdown_link_and_image_are_both_external() {
        let body = "A [link](https://example.com/a) and an ![alt](https://example.com/b.png).";
        let extracted = extract(body);
        assert_eq!(extracted.external.len(), 3); // md link + image + bare-url rescans both
        assert!(extracted
            .external
            .iter()
            .any(|e| e.url == "https://example.com/a" && e.label.as_deref() == Some("link")));
        assert!(extracted
            .external
            .iter()
            .any(|e| e.url == "https://example.com/b.png" && e.label.as_deref() == Some("alt")));
    }

    #[test]
    fn overlapping_patterns_both_fire() {
        let body = "[label](https://example.com/x)";
        let extracted = extract(body);
        // The markdown-link pattern fires once, and the bare-url pattern
        // independently fires on the URL text nested inside it.
        let md_hits = extracted
            .external
            .iter()
            .filter(|e| e.label.as_deref() == Some("label"))
            .count();
        let bare_hits = extracted.external.iter().filter(|e| e.label.is_none()).count();
        assert_eq!(md_hits, 1);
        assert_eq!(bare_hits, 1);
    }

    #[test]
    fn bare_url_is_captured() {
        let body = "Visit https://example.com/page for details.";
        let extracted = extract(body);
        assert_eq!(extracted.external.len(), 1);
        assert_eq!(extracted.external[0].url, "https://example.com/page");
    }

    #[test]
    fn resolve_prefers_id_over_title() {
        let refs = vec![InternalRef {
            target_text: "general/other".to_string(),
            display: "general/other".to_string(),
            position: 0,
        }];
        let mut ids = HashSet::new();
        ids.insert("general/other".to_string());
        let titles = HashMap::new();
        let resolved = resolve_internal(&refs, &ids, &titles);
        assert_eq!(resolved[0].target_note_id.as_deref(), Some("general/other"));
    }

    #[test]
    fn resolve_falls_back_to_title_then_broken() {
        let refs = vec![
            InternalRef {
                target_text: "Future Title".to_string(),
                display: "Future Title".to_string(),
                position: 0,
            },
            InternalRef {
                target_text: "Nowhere".to_string(),
                display: "Nowhere".to_string(),
                position: 20,
            },
        ];
        let ids = HashSet::new();
        let mut titles = HashMap::new();
        titles.insert("Future Title".to_string(), "projects/draft".to_string());
        let resolved = resolve_internal(&refs, &ids, &titles);
        assert_eq!(resolved[0].target_note_id.as_deref(), Some("projects/draft"));
        assert_eq!(resolved[1].target_note_id, None);
        assert_eq!(resolved[1].target_title, "Nowhere");
    }
}
