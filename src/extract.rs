//! Context extraction from free text.
//!
//! Finds the concepts a piece of text talks about (`[[links]]`, `#tags`,
//! double-quoted phrases) and the dates it mentions, then resolves them
//! against the graph.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::content::extract_page_refs;
use crate::dates::{format_date_key, journal_title, parse_date_input};
use crate::error::Result;
use crate::gateway::LogseqApi;
use crate::model::flatten_blocks;
use crate::network::LinkDirection;
use crate::query::{self, normalize_page_name};

const PREVIEW_BLOCKS: usize = 3;
const MAX_NEIGHBOURS: usize = 10;

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"\n]{2,80})""#).expect("Invalid regex pattern"))
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{4}-\d{2}-\d{2}|today|yesterday|tomorrow)\b")
            .expect("Invalid regex pattern")
    })
}

/// Candidate concept names in order of appearance, deduplicated.
pub fn extract_concepts(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for name in extract_page_refs(text) {
        let pos = text.find(name.as_str()).unwrap_or(usize::MAX);
        found.push((pos, name));
    }
    for cap in quoted_regex().captures_iter(text) {
        if let Some(m) = cap.get(1) {
            found.push((m.start(), m.as_str().trim().to_string()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty() && seen.insert(normalize_page_name(name)))
        .collect()
}

/// Date keys mentioned in the text. Unparseable dates are skipped.
pub fn extract_dates(text: &str) -> Vec<u32> {
    let mut seen = HashSet::new();
    date_regex()
        .find_iter(text)
        .filter_map(|m| parse_date_input(m.as_str()).ok())
        .filter(|key| seen.insert(*key))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbour {
    pub name: String,
    pub direction: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMatch {
    pub name: String,
    pub block_count: usize,
    pub preview: Vec<String>,
    pub neighbours: Vec<Neighbour>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateMatch {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_page: Option<String>,
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContext {
    pub concepts: Vec<ConceptMatch>,
    pub missing_concepts: Vec<String>,
    pub dates: Vec<DateMatch>,
}

/// Resolve the concepts and dates found in `text`, examining at most
/// `max_concepts` concepts.
pub async fn extract_context(api: &LogseqApi, text: &str, max_concepts: usize) -> Result<ExtractedContext> {
    let mut concepts = Vec::new();
    let mut missing_concepts = Vec::new();

    for name in extract_concepts(text).into_iter().take(max_concepts) {
        let Some(page) = api.page(&name).await? else {
            missing_concepts.push(name);
            continue;
        };
        let blocks = flatten_blocks(&api.page_blocks(&page.name).await?);
        let neighbours = direct_neighbours(api, &page.name).await?;
        concepts.push(ConceptMatch {
            name: page.display_name().to_string(),
            block_count: blocks.len(),
            preview: blocks
                .iter()
                .map(|b| b.content.clone())
                .filter(|c| !c.trim().is_empty())
                .take(PREVIEW_BLOCKS)
                .collect(),
            neighbours,
        });
    }

    let mut dates = Vec::new();
    for key in extract_dates(text) {
        // Default journal titles resolve directly; other title formats go
        // through the journal-day index
        let journal = match api.page(&journal_title(key)?).await? {
            Some(page) => Some(page),
            None => api
                .query_pages(&query::journals_between(key, key))
                .await?
                .into_iter()
                .next(),
        };
        let (journal_page, blocks) = match journal {
            Some(page) => {
                let tree = api.page_blocks(&page.name).await?;
                let blocks = flatten_blocks(&tree)
                    .into_iter()
                    .map(|b| b.content)
                    .filter(|c| !c.trim().is_empty())
                    .collect();
                (Some(page.display_name().to_string()), blocks)
            }
            None => (None, Vec::new()),
        };
        dates.push(DateMatch {
            date: format_date_key(key)?,
            journal_page,
            blocks,
        });
    }

    Ok(ExtractedContext {
        concepts,
        missing_concepts,
        dates,
    })
}

/// One-hop neighbours from a single concept-network query.
async fn direct_neighbours(api: &LogseqApi, name: &str) -> Result<Vec<Neighbour>> {
    let rows = api
        .datascript_query(&query::concept_network(name, 1), Vec::new())
        .await?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let mut cols = row.into_iter().skip(1);
        let (Some(connected), Some(rel)) = (cols.next(), cols.next()) else {
            continue;
        };
        let Ok(page) = serde_json::from_value::<crate::model::Page>(connected) else {
            continue;
        };
        let Some(direction) = rel.as_str().and_then(LinkDirection::from_label) else {
            continue;
        };
        let label = match direction {
            LinkDirection::Outbound => "outbound",
            LinkDirection::Inbound => "inbound",
        };
        if seen.insert((page.id, label)) && out.len() < MAX_NEIGHBOURS {
            out.push(Neighbour {
                name: page.display_name().to_string(),
                direction: label,
            });
        }
    }
    Ok(out)
}
