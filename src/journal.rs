//! Journal queries: pages in a date range and a concept's timeline across
//! journal pages.

use serde::Serialize;

use crate::dates::{format_date_key, parse_date_key};
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::model::flatten_blocks;
use crate::query;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub date: String,
    pub date_key: u32,
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRange {
    pub start: String,
    pub end: String,
    pub total: usize,
    pub journals: Vec<JournalEntry>,
}

fn validate_range(start: u32, end: u32) -> Result<()> {
    parse_date_key(start)?;
    parse_date_key(end)?;
    if start > end {
        return Err(BridgeError::InvalidInput(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    Ok(())
}

/// Journal pages dated within `[start, end]`, oldest first, at most `limit`.
pub async fn journals_in_range(
    api: &LogseqApi,
    start: u32,
    end: u32,
    include_blocks: bool,
    limit: usize,
) -> Result<JournalRange> {
    validate_range(start, end)?;

    let mut pages: Vec<_> = api
        .query_pages(&query::journals_between(start, end))
        .await?
        .into_iter()
        .filter(|p| p.journal_day.is_some())
        .collect();
    pages.sort_by_key(|p| p.journal_day);
    let total = pages.len();

    let mut journals = Vec::new();
    for page in pages.into_iter().take(limit) {
        let Some(day) = page.journal_day else { continue };
        let blocks = if include_blocks {
            let tree = api.page_blocks(&page.name).await?;
            Some(
                flatten_blocks(&tree)
                    .into_iter()
                    .map(|b| b.content)
                    .filter(|c| !c.trim().is_empty())
                    .collect(),
            )
        } else {
            None
        };
        journals.push(JournalEntry {
            date: format_date_key(day)?,
            date_key: day,
            page: page.display_name().to_string(),
            blocks,
        });
    }

    Ok(JournalRange {
        start: format_date_key(start)?,
        end: format_date_key(end)?,
        total,
        journals,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub date: String,
    pub date_key: u32,
    pub page: String,
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptEvolution {
    pub concept: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_mention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_mention: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    /// Referencing pages that are not journals
    pub other_references: Vec<String>,
}

/// Journal mentions of `concept` over time.
pub async fn concept_evolution(
    api: &LogseqApi,
    concept: &str,
    start: Option<u32>,
    end: Option<u32>,
) -> Result<ConceptEvolution> {
    if let (Some(s), Some(e)) = (start, end) {
        validate_range(s, e)?;
    }
    for key in [start, end].into_iter().flatten() {
        parse_date_key(key)?;
    }

    let page = api
        .page(concept)
        .await?
        .ok_or_else(|| BridgeError::PageNotFound(concept.to_string()))?;

    let mut timeline = Vec::new();
    let mut other_references = Vec::new();
    for backlink in api.linked_references(&page.name).await?.unwrap_or_default() {
        let source = backlink.page;
        let Some(day) = source.journal_day.filter(|_| source.is_journal()) else {
            other_references.push(source.display_name().to_string());
            continue;
        };
        if start.map_or(false, |s| day < s) || end.map_or(false, |e| day > e) {
            continue;
        }
        timeline.push(TimelineEntry {
            date: format_date_key(day)?,
            date_key: day,
            page: source.display_name().to_string(),
            mentions: backlink.blocks.into_iter().map(|b| b.content).collect(),
        });
    }
    timeline.sort_by_key(|t| t.date_key);

    Ok(ConceptEvolution {
        concept: page.display_name().to_string(),
        first_mention: timeline.first().map(|t| t.date.clone()),
        last_mention: timeline.last().map(|t| t.date.clone()),
        timeline,
        other_references,
    })
}
