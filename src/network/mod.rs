//! Concept network traversal: bounded BFS over page links.
//!
//! Two strategies discover the same network:
//! - [`DatalogTraversal`] issues one batched Datalog query per BFS level.
//! - [`SequentialTraversal`] fetches block trees and linked references page
//!   by page.
//!
//! Edges are classified relative to the page being expanded: a link found on
//! the expanded page is a `reference` (expanded → other), a link pointing at
//! it from elsewhere is a `backlink` (other → expanded).

mod datalog;
mod sequential;

pub use datalog::DatalogTraversal;
pub use sequential::SequentialTraversal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::gateway::LogseqApi;
use crate::model::Page;

/// A page discovered during traversal with its BFS distance from the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: i64,
    pub name: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Outbound: the source page's blocks reference the target.
    Reference,
    /// Inbound: recorded as other → expanded page.
    Backlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub from: i64,
    pub to: i64,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Direction of a discovered link relative to the expanded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    Outbound,
    Inbound,
}

impl LinkDirection {
    /// Parse the relationship label used in Datalog rows.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "outbound" => Some(LinkDirection::Outbound),
            "inbound" => Some(LinkDirection::Inbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Datalog,
    Sequential,
}

impl Strategy {
    pub fn from_flag(use_datalog: bool) -> Self {
        if use_datalog {
            Strategy::Datalog
        } else {
            Strategy::Sequential
        }
    }
}

/// Result of one traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNetwork {
    pub root: String,
    pub max_hops: usize,
    pub strategy: Strategy,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl ConceptNetwork {
    pub fn node_ids(&self) -> HashSet<i64> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn node(&self, id: i64) -> Option<&NetworkNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn root_node(&self) -> Option<&NetworkNode> {
        self.nodes.iter().find(|n| n.depth == 0)
    }
}

#[async_trait]
pub trait NetworkTraversal: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Discover pages within `max_hops` links of `root`.
    ///
    /// Fails with `PageNotFound(root)` when the root page does not exist.
    /// Any other failure aborts the whole traversal.
    async fn traverse(&self, root: &str, max_hops: usize) -> Result<ConceptNetwork>;
}

/// Boxed traversal for the selected strategy.
pub fn traversal_for(strategy: Strategy, api: LogseqApi) -> Box<dyn NetworkTraversal> {
    match strategy {
        Strategy::Datalog => Box::new(DatalogTraversal::new(api)),
        Strategy::Sequential => Box::new(SequentialTraversal::new(api)),
    }
}

/// Node/edge accumulator shared by both strategies.
///
/// Keeps node ids unique (first discovery wins, which is the lowest depth in
/// BFS order) and drops exact duplicate edges.
pub(crate) struct NetworkBuilder {
    root: String,
    max_hops: usize,
    strategy: Strategy,
    order: Vec<i64>,
    nodes: HashMap<i64, NetworkNode>,
    edges: Vec<NetworkEdge>,
    seen_edges: HashSet<NetworkEdge>,
}

impl NetworkBuilder {
    pub(crate) fn new(root: &Page, max_hops: usize, strategy: Strategy) -> Self {
        let mut builder = Self {
            root: root.display_name().to_string(),
            max_hops,
            strategy,
            order: Vec::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
        };
        builder.visit(root, 0);
        builder
    }

    /// Record `page` at `depth`; returns false if it was already visited.
    pub(crate) fn visit(&mut self, page: &Page, depth: usize) -> bool {
        if self.nodes.contains_key(&page.id) {
            return false;
        }
        self.order.push(page.id);
        self.nodes.insert(
            page.id,
            NetworkNode {
                id: page.id,
                name: page.display_name().to_string(),
                depth,
            },
        );
        true
    }

    /// Record the edge implied by a link between `source` (the expanded
    /// page) and `connected`.
    pub(crate) fn link(&mut self, source: i64, connected: i64, direction: LinkDirection) {
        let edge = match direction {
            LinkDirection::Outbound => NetworkEdge {
                from: source,
                to: connected,
                kind: EdgeKind::Reference,
            },
            LinkDirection::Inbound => NetworkEdge {
                from: connected,
                to: source,
                kind: EdgeKind::Backlink,
            },
        };
        if self.seen_edges.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }

    pub(crate) fn finish(mut self) -> ConceptNetwork {
        let nodes = self
            .order
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect();
        ConceptNetwork {
            root: self.root,
            max_hops: self.max_hops,
            strategy: self.strategy,
            nodes,
            edges: self.edges,
        }
    }
}
