//! Relationship search between two pages.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use crate::content::mentions;
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::model::{flatten_blocks, Block};
use crate::query::normalize_page_name;

/// How to look for a relationship between `source` and `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Blocks on the source page that mention the target.
    ContentReference,
    /// Blocks on pages linking to the target that also mention the source.
    Backlinks,
    /// Bounded BFS from the source over links in both directions.
    Reachability { max_hops: usize },
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::ContentReference => "references",
            RelationKind::Backlinks => "backlinks",
            RelationKind::Reachability { .. } => "connected",
        }
    }
}

/// A block offered as evidence, tagged with the page it lives on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBlock {
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub content: String,
}

impl EvidenceBlock {
    fn new(page: &str, block: &Block) -> Self {
        Self {
            page: page.to_string(),
            uuid: block.uuid.clone(),
            content: block.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub kind: &'static str,
    pub connected: bool,
    /// Hop count at which the target was reached (reachability only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<usize>,
    pub blocks: Vec<EvidenceBlock>,
}

pub struct RelationshipSearch {
    api: LogseqApi,
}

impl RelationshipSearch {
    pub fn new(api: LogseqApi) -> Self {
        Self { api }
    }

    pub async fn find(&self, source: &str, target: &str, kind: RelationKind) -> Result<Relationship> {
        let (connected, distance, blocks) = match kind {
            RelationKind::ContentReference => {
                let blocks = self.content_references(source, target).await?;
                (!blocks.is_empty(), None, blocks)
            }
            RelationKind::Backlinks => {
                let blocks = self.via_backlinks(source, target).await?;
                (!blocks.is_empty(), None, blocks)
            }
            RelationKind::Reachability { max_hops } => {
                match self.reachable(source, target, max_hops).await? {
                    Some(distance) => {
                        let mut blocks = self.page_evidence(source).await?;
                        blocks.extend(self.page_evidence(target).await?);
                        (true, Some(distance), blocks)
                    }
                    None => (false, None, Vec::new()),
                }
            }
        };

        Ok(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            kind: kind.label(),
            connected,
            distance,
            blocks,
        })
    }

    /// Blocks on `source` mentioning `target`. A missing source page has no
    /// blocks, so this degrades to an empty list.
    async fn content_references(&self, source: &str, target: &str) -> Result<Vec<EvidenceBlock>> {
        let blocks = flatten_blocks(&self.api.page_blocks(source).await?);
        Ok(blocks
            .iter()
            .filter(|b| mentions(&b.content, target))
            .map(|b| EvidenceBlock::new(source, b))
            .collect())
    }

    /// Blocks on pages that link to `target` and also mention `source`.
    async fn via_backlinks(&self, source: &str, target: &str) -> Result<Vec<EvidenceBlock>> {
        let Some(backlinks) = self.api.linked_references(target).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for backlink in backlinks {
            let page_name = backlink.page.display_name().to_string();
            let blocks = flatten_blocks(&self.api.page_blocks(&backlink.page.name).await?);
            out.extend(
                blocks
                    .iter()
                    .filter(|b| mentions(&b.content, source))
                    .map(|b| EvidenceBlock::new(&page_name, b)),
            );
        }
        Ok(out)
    }

    /// Hop distance from `source` to `target`, or `None` when the target is
    /// not within `max_hops`. The source page must exist.
    async fn reachable(&self, source: &str, target: &str, max_hops: usize) -> Result<Option<usize>> {
        let start = self
            .api
            .page(source)
            .await?
            .ok_or_else(|| BridgeError::PageNotFound(source.to_string()))?;
        let goal = normalize_page_name(target);
        if start.name == goal {
            return Ok(Some(0));
        }

        let mut visited = HashSet::new();
        visited.insert(start.name.clone());
        let mut queue = VecDeque::new();
        queue.push_back((start.name, 0usize));

        while let Some((name, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            for neighbour in self.neighbours(&name).await? {
                if neighbour == goal {
                    log::debug!("{} reaches {} in {} hops", source, target, depth + 1);
                    return Ok(Some(depth + 1));
                }
                if visited.insert(neighbour.clone()) {
                    queue.push_back((neighbour, depth + 1));
                }
            }
        }
        Ok(None)
    }

    /// Lower-cased names of existing pages linked from or linking to `name`.
    async fn neighbours(&self, name: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();
        for block in flatten_blocks(&self.api.page_blocks(name).await?) {
            for reference in &block.refs {
                if !ids.insert(reference.id) {
                    continue;
                }
                if let Some(page) = self.api.page_by_id(reference.id).await? {
                    if seen.insert(page.name.clone()) {
                        names.push(page.name);
                    }
                }
            }
        }
        for backlink in self.api.linked_references(name).await?.unwrap_or_default() {
            if seen.insert(backlink.page.name.clone()) {
                names.push(backlink.page.name);
            }
        }
        Ok(names)
    }

    async fn page_evidence(&self, name: &str) -> Result<Vec<EvidenceBlock>> {
        let display = match self.api.page(name).await? {
            Some(page) => page.display_name().to_string(),
            None => name.to_string(),
        };
        Ok(flatten_blocks(&self.api.page_blocks(name).await?)
            .iter()
            .map(|b| EvidenceBlock::new(&display, b))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryGraph;

    fn fixture() -> LogseqApi {
        let mut g = MemoryGraph::new();
        for name in ["Rust", "Ownership", "Borrowing", "Lifetimes", "Gardening", "Notes"] {
            g.add_page(name);
        }
        g.add_block("Rust", "Core idea: [[Ownership]]");
        g.add_block("Rust", "unrelated line");
        let parent = g.add_block("Notes", "Reading about [[Borrowing]]");
        g.add_child_block(parent, "it builds on #Rust semantics");
        g.add_block("Ownership", "leads to [[Lifetimes]]");
        g.add_block("Gardening", "tomatoes");
        g.into_api()
    }

    #[tokio::test]
    async fn test_content_reference() {
        let search = RelationshipSearch::new(fixture());
        let rel = search.find("Rust", "ownership", RelationKind::ContentReference).await.unwrap();
        assert!(rel.connected);
        assert_eq!(rel.blocks.len(), 1);
        assert!(rel.blocks[0].content.contains("[[Ownership]]"));

        let rel = search.find("Rust", "Gardening", RelationKind::ContentReference).await.unwrap();
        assert!(!rel.connected);
        assert!(rel.blocks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_degrades_to_empty() {
        let search = RelationshipSearch::new(fixture());
        let rel = search.find("Nope", "Rust", RelationKind::ContentReference).await.unwrap();
        assert!(!rel.connected);
        let rel = search.find("Rust", "Nope", RelationKind::Backlinks).await.unwrap();
        assert!(!rel.connected);
    }

    #[tokio::test]
    async fn test_via_backlinks() {
        let search = RelationshipSearch::new(fixture());
        // Notes links to Borrowing and its nested block mentions Rust
        let rel = search.find("Rust", "Borrowing", RelationKind::Backlinks).await.unwrap();
        assert!(rel.connected);
        assert_eq!(rel.blocks.len(), 1);
        assert_eq!(rel.blocks[0].page, "Notes");
        assert!(rel.blocks[0].content.contains("#Rust"));
    }

    #[tokio::test]
    async fn test_reachability_within_hops() {
        let search = RelationshipSearch::new(fixture());
        let rel = search
            .find("Rust", "Lifetimes", RelationKind::Reachability { max_hops: 3 })
            .await
            .unwrap();
        assert!(rel.connected);
        assert_eq!(rel.distance, Some(2));
        // evidence is the union of both pages' blocks
        assert_eq!(rel.blocks.iter().filter(|b| b.page == "Rust").count(), 2);
        assert_eq!(rel.blocks.iter().filter(|b| b.page == "Lifetimes").count(), 0);

        let rel = search
            .find("Rust", "Lifetimes", RelationKind::Reachability { max_hops: 1 })
            .await
            .unwrap();
        assert!(!rel.connected);
        assert!(rel.blocks.is_empty());
    }

    #[tokio::test]
    async fn test_reachability_through_backlinks() {
        let search = RelationshipSearch::new(fixture());
        // Rust <- Notes -> Borrowing
        let rel = search
            .find("Rust", "Borrowing", RelationKind::Reachability { max_hops: 2 })
            .await
            .unwrap();
        assert_eq!(rel.distance, Some(2));
    }

    #[tokio::test]
    async fn test_reachability_not_connected() {
        let search = RelationshipSearch::new(fixture());
        let rel = search
            .find("Rust", "Gardening", RelationKind::Reachability { max_hops: 5 })
            .await
            .unwrap();
        assert!(!rel.connected);
    }

    #[tokio::test]
    async fn test_reachability_ignores_links_to_missing_pages() {
        let (graph, api) = {
            let mut g = MemoryGraph::new();
            g.add_page("Rust");
            g.add_block("Rust", "someday write up [[Ghost]]");
            g.into_shared()
        };
        let rel = RelationshipSearch::new(api)
            .find("Rust", "Ghost", RelationKind::Reachability { max_hops: 3 })
            .await
            .unwrap();
        assert!(!rel.connected);
        assert_eq!(rel.distance, None);
        assert!(rel.blocks.is_empty());
        assert_eq!(graph.call_count(crate::gateway::methods::GET_PAGE_BLOCKS_TREE), 1);
    }

    #[tokio::test]
    async fn test_reachability_requires_source() {
        let search = RelationshipSearch::new(fixture());
        let err = search
            .find("Ghost Page", "Rust", RelationKind::Reachability { max_hops: 2 })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Ghost Page"));
    }
}
