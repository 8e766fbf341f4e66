//! BFS driven by batched Datalog queries (one query per level).

use async_trait::async_trait;
use serde_json::Value;

use super::{ConceptNetwork, LinkDirection, NetworkBuilder, NetworkTraversal, Strategy};
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::model::Page;
use crate::query;

pub struct DatalogTraversal {
    api: LogseqApi,
}

impl DatalogTraversal {
    pub fn new(api: LogseqApi) -> Self {
        Self { api }
    }

    async fn resolve_root(&self, root: &str) -> Result<Page> {
        let pages = self
            .api
            .query_pages(&query::concept_network(root, 0))
            .await?;
        pages
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::PageNotFound(root.to_string()))
    }
}

/// One `[source-id, connected, rel]` row; `None` when the connected page
/// or the label is unusable.
fn parse_row(row: Vec<Value>) -> Option<(i64, Page, LinkDirection)> {
    let mut cols = row.into_iter();
    let source = cols.next()?.as_i64()?;
    let connected = cols.next()?;
    if connected.is_null() {
        return None;
    }
    let connected: Page = serde_json::from_value(connected).ok()?;
    let direction = LinkDirection::from_label(cols.next()?.as_str()?)?;
    Some((source, connected, direction))
}

#[async_trait]
impl NetworkTraversal for DatalogTraversal {
    fn strategy(&self) -> Strategy {
        Strategy::Datalog
    }

    async fn traverse(&self, root: &str, max_hops: usize) -> Result<ConceptNetwork> {
        let root_page = self.resolve_root(root).await?;
        let mut builder = NetworkBuilder::new(&root_page, max_hops, Strategy::Datalog);
        if max_hops == 0 {
            return Ok(builder.finish());
        }

        let mut frontier = vec![root_page.id];
        let mut depth = 1;

        while !frontier.is_empty() && depth <= max_hops {
            let rows = self
                .api
                .datascript_query(&query::connected_pages(&frontier), Vec::new())
                .await?;
            log::debug!(
                "datalog level {}: frontier {} -> {} rows",
                depth,
                frontier.len(),
                rows.len()
            );
            if rows.is_empty() {
                break;
            }

            let mut next = Vec::new();
            for row in rows {
                let Some((source, connected, direction)) = parse_row(row) else {
                    continue;
                };
                builder.link(source, connected.id, direction);
                if builder.visit(&connected, depth) {
                    next.push(connected.id);
                }
            }

            frontier = next;
            depth += 1;
        }

        Ok(builder.finish())
    }
}
