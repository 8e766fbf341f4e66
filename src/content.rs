//! Page references embedded in block text (regex-based).
//!
//! Recognised forms: `[[Page Name]]`, `#[[Page Name]]`, `#tag` and the
//! comma-separated values of `tags::` / `alias::` property lines. Inline
//! code spans are not scanned.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::query::normalize_page_name;

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("Invalid regex pattern"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Starts after whitespace or line start; trailing `.` and `:` are
    // sentence punctuation, interior ones belong to the tag (`#v1.0`).
    RE.get_or_init(|| {
        Regex::new(r#"(?:^|\s)#([^\s#\[\],;!?()"`]+)"#).expect("Invalid regex pattern")
    })
}

fn code_span_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]*`").expect("Invalid regex pattern"))
}

fn ref_property_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*(?:tags|alias)::[ \t]*(.*)$").expect("Invalid regex pattern")
    })
}

/// Page names referenced by `content`, in order of first appearance, with
/// original casing. Duplicates (case-insensitive) are dropped.
pub fn extract_page_refs(content: &str) -> Vec<String> {
    // Blank out code spans byte for byte so match offsets stay valid
    let masked = code_span_regex().replace_all(content, |c: &Captures| " ".repeat(c[0].len()));

    let mut found: Vec<(usize, String)> = Vec::new();
    for cap in bracket_regex().captures_iter(&masked) {
        if let Some(m) = cap.get(1) {
            found.push((m.start(), m.as_str().trim().to_string()));
        }
    }
    for cap in tag_regex().captures_iter(&masked) {
        if let Some(m) = cap.get(1) {
            let tag = m.as_str().trim_end_matches(['.', ':']);
            found.push((m.start(), tag.to_string()));
        }
    }
    for cap in ref_property_regex().captures_iter(&masked) {
        if let Some(m) = cap.get(1) {
            for value in m.as_str().split(',') {
                let name = value
                    .trim()
                    .trim_start_matches('#')
                    .trim_start_matches("[[")
                    .trim_end_matches("]]")
                    .trim();
                found.push((m.start(), name.to_string()));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for (_, name) in found {
        if name.is_empty() {
            continue;
        }
        if seen.insert(normalize_page_name(&name)) {
            refs.push(name);
        }
    }
    refs
}

/// True when `content` references the page `name` by link or tag.
pub fn mentions(content: &str, name: &str) -> bool {
    let target = normalize_page_name(name);
    if target.is_empty() {
        return false;
    }
    extract_page_refs(content)
        .iter()
        .any(|r| normalize_page_name(r) == target)
}
