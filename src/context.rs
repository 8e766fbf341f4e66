//! Topic context: one page enriched with its blocks, neighbours and
//! references.
//!
//! The main page lookup and block fetch propagate their errors. The
//! neighbour and reference steps are best effort and report their outcome
//! in [`ContextDiagnostics`].

use serde::Serialize;
use std::collections::HashSet;

use crate::config::ContextConfig;
use crate::dates::format_date_key;
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::model::{flatten_blocks, Block, Page};
use crate::network::{EdgeKind, NetworkTraversal};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPage {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub content: String,
}

impl From<&Block> for ContextBlock {
    fn from(block: &Block) -> Self {
        Self {
            uuid: block.uuid.clone(),
            content: block.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedVia {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPage {
    pub id: i64,
    pub name: String,
    pub relationship: RelatedVia,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalContext {
    pub is_journal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_key: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub total_blocks: usize,
    pub related_pages_count: usize,
    pub references_count: usize,
}

/// Outcome of a best-effort step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    /// The step produced data.
    Complete,
    /// The step ran but there was nothing to collect.
    Empty,
    /// The sub-query failed; the collection was left empty.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDiagnostics {
    pub related_pages: StepOutcome,
    pub references: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContext {
    pub topic: String,
    pub main_page: MainPage,
    pub direct_blocks: Vec<ContextBlock>,
    pub related_pages: Vec<RelatedPage>,
    pub references: Vec<ReferenceEntry>,
    pub temporal_context: TemporalContext,
    pub summary: ContextSummary,
    pub diagnostics: ContextDiagnostics,
}

pub struct ContextBuilder<'a> {
    api: LogseqApi,
    traversal: &'a dyn NetworkTraversal,
    limits: ContextConfig,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(api: LogseqApi, traversal: &'a dyn NetworkTraversal, limits: ContextConfig) -> Self {
        Self {
            api,
            traversal,
            limits,
        }
    }

    pub async fn build(&self, topic: &str) -> Result<TopicContext> {
        let page = self
            .api
            .page(topic)
            .await?
            .ok_or_else(|| BridgeError::PageNotFound(topic.to_string()))?;

        let direct_blocks = self.direct_blocks(&page).await?;

        let mut related_pages = Vec::new();
        let related_outcome = match self.related_from_network(&page).await {
            Ok(related) => {
                related_pages = related;
                outcome_for(related_pages.len())
            }
            Err(e) => {
                log::warn!("topic context '{}': network step failed: {}", topic, e);
                StepOutcome::Failed { reason: e.to_string() }
            }
        };

        let mut references = Vec::new();
        let references_outcome = match self.api.linked_references(&page.name).await {
            Ok(backlinks) => {
                let mut seen: HashSet<i64> = related_pages.iter().map(|r| r.id).collect();
                for backlink in backlinks.unwrap_or_default() {
                    let source = backlink.page.display_name().to_string();
                    for block in &backlink.blocks {
                        if references.len() >= self.limits.max_references {
                            break;
                        }
                        references.push(ReferenceEntry {
                            page: source.clone(),
                            uuid: block.uuid.clone(),
                            content: block.content.clone(),
                        });
                    }
                    if backlink.page.id != page.id
                        && related_pages.len() < self.limits.max_related_pages
                        && seen.insert(backlink.page.id)
                    {
                        related_pages.push(RelatedPage {
                            id: backlink.page.id,
                            name: source,
                            relationship: RelatedVia::Inbound,
                        });
                    }
                }
                outcome_for(references.len())
            }
            Err(e) => {
                log::warn!("topic context '{}': backlink step failed: {}", topic, e);
                StepOutcome::Failed { reason: e.to_string() }
            }
        };

        let temporal_context = match page.journal_day.filter(|_| page.is_journal()) {
            Some(day) => TemporalContext {
                is_journal: true,
                date: format_date_key(day).ok(),
                date_key: Some(day),
            },
            None => TemporalContext {
                is_journal: false,
                date: None,
                date_key: None,
            },
        };

        let summary = ContextSummary {
            total_blocks: direct_blocks.len(),
            related_pages_count: related_pages.len(),
            references_count: references.len(),
        };

        Ok(TopicContext {
            topic: topic.to_string(),
            main_page: MainPage {
                id: page.id,
                name: page.display_name().to_string(),
                properties: page.properties.clone(),
            },
            direct_blocks,
            related_pages,
            references,
            temporal_context,
            summary,
            diagnostics: ContextDiagnostics {
                related_pages: related_outcome,
                references: references_outcome,
            },
        })
    }

    /// Blocks of the page in document order, truncated to the cap.
    async fn direct_blocks(&self, page: &Page) -> Result<Vec<ContextBlock>> {
        let tree = self.api.page_blocks(&page.name).await?;
        Ok(flatten_blocks(&tree)
            .iter()
            .take(self.limits.max_blocks)
            .map(ContextBlock::from)
            .collect())
    }

    /// Depth-1 neighbours, tagged by the direction of their first edge.
    async fn related_from_network(&self, page: &Page) -> Result<Vec<RelatedPage>> {
        let network = self.traversal.traverse(&page.name, 1).await?;
        let root = network.root_node().map(|n| n.id).unwrap_or(page.id);
        let mut related = Vec::new();
        for node in network.nodes.iter().filter(|n| n.depth == 1) {
            if related.len() >= self.limits.max_related_pages {
                break;
            }
            let relationship = network
                .edges
                .iter()
                .find(|e| (e.from == root && e.to == node.id) || (e.from == node.id && e.to == root))
                .map(|e| match e.kind {
                    EdgeKind::Reference => RelatedVia::Outbound,
                    EdgeKind::Backlink => RelatedVia::Inbound,
                })
                .unwrap_or(RelatedVia::Outbound);
            related.push(RelatedPage {
                id: node.id,
                name: node.name.clone(),
                relationship,
            });
        }
        Ok(related)
    }
}

fn outcome_for(len: usize) -> StepOutcome {
    if len == 0 {
        StepOutcome::Empty
    } else {
        StepOutcome::Complete
    }
}
