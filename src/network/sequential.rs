//! BFS driven by per-page fetches: block trees for outbound links,
//! linked references for inbound links.

use async_trait::async_trait;
use std::collections::HashSet;

use super::{ConceptNetwork, LinkDirection, NetworkBuilder, NetworkTraversal, Strategy};
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::model::{flatten_blocks, Page};

pub struct SequentialTraversal {
    api: LogseqApi,
}

impl SequentialTraversal {
    pub fn new(api: LogseqApi) -> Self {
        Self { api }
    }

    /// Pages referenced from `page`'s blocks, read from the `refs` Logseq
    /// indexed for each block. Ids that are not pages are skipped, as are
    /// self references.
    async fn outbound(&self, page: &Page) -> Result<Vec<Page>> {
        let blocks = flatten_blocks(&self.api.page_blocks(&page.name).await?);
        let mut seen = HashSet::new();
        let mut pages = Vec::new();
        let ids: Vec<_> = blocks.iter().flat_map(|b| b.refs.iter().map(|r| r.id)).collect();
        for id in ids {
            if id == page.id || !seen.insert(id) {
                continue;
            }
            if let Some(target) = self.api.page_by_id(id).await? {
                pages.push(target);
            }
        }
        Ok(pages)
    }

    /// Pages whose blocks reference `page`.
    async fn inbound(&self, page: &Page) -> Result<Vec<Page>> {
        let backlinks = self.api.linked_references(&page.name).await?.unwrap_or_default();
        Ok(backlinks
            .into_iter()
            .map(|b| b.page)
            .filter(|p| p.id != page.id)
            .collect())
    }
}

#[async_trait]
impl NetworkTraversal for SequentialTraversal {
    fn strategy(&self) -> Strategy {
        Strategy::Sequential
    }

    async fn traverse(&self, root: &str, max_hops: usize) -> Result<ConceptNetwork> {
        let root_page = self
            .api
            .page(root)
            .await?
            .ok_or_else(|| BridgeError::PageNotFound(root.to_string()))?;
        let mut builder = NetworkBuilder::new(&root_page, max_hops, Strategy::Sequential);
        if max_hops == 0 {
            return Ok(builder.finish());
        }

        let mut frontier = vec![root_page];
        let mut depth = 1;

        while !frontier.is_empty() && depth <= max_hops {
            let mut next = Vec::new();
            let mut rows = 0;

            for page in &frontier {
                let outbound = self.outbound(page).await?;
                let inbound = self.inbound(page).await?;
                let links = outbound
                    .into_iter()
                    .map(|p| (p, LinkDirection::Outbound))
                    .chain(inbound.into_iter().map(|p| (p, LinkDirection::Inbound)));
                for (connected, direction) in links {
                    rows += 1;
                    builder.link(page.id, connected.id, direction);
                    if builder.visit(&connected, depth) {
                        next.push(connected);
                    }
                }
            }

            log::debug!(
                "sequential level {}: frontier {} -> {} links",
                depth,
                frontier.len(),
                rows
            );
            if rows == 0 {
                break;
            }

            frontier = next;
            depth += 1;
        }

        Ok(builder.finish())
    }
}
