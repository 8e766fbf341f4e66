use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{methods, GraphGateway};
use crate::error::{BridgeError, Result};
use crate::model::{Backlink, Block, Page};
use crate::query::normalize_page_name;

/// Typed primitives over a [`GraphGateway`].
///
/// Cheap to clone; all clones share the same gateway. Names are folded with
/// [`normalize_page_name`] before they leave this type.
#[derive(Clone)]
pub struct LogseqApi {
    gateway: Arc<dyn GraphGateway>,
}

impl LogseqApi {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self { gateway }
    }

    /// Raw call passthrough.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.gateway.call(method, args).await
    }

    /// Page by name, `None` when absent.
    pub async fn page(&self, name: &str) -> Result<Option<Page>> {
        let value = self
            .call(methods::GET_PAGE, vec![json!(normalize_page_name(name))])
            .await?;
        decode_optional(value, "page")
    }

    /// Page by entity id. Ids of non-page entities (blocks) yield `None`.
    pub async fn page_by_id(&self, id: i64) -> Result<Option<Page>> {
        let value = self.call(methods::GET_PAGE, vec![json!(id)]).await?;
        if value.get("name").map_or(true, Value::is_null) {
            return Ok(None);
        }
        decode_optional(value, "page")
    }

    /// Top-level blocks of a page with their children nested.
    /// An absent page yields an empty list.
    pub async fn page_blocks(&self, name: &str) -> Result<Vec<Block>> {
        let value = self
            .call(methods::GET_PAGE_BLOCKS_TREE, vec![json!(normalize_page_name(name))])
            .await?;
        Ok(decode_optional(value, "block tree")?.unwrap_or_default())
    }

    /// Pages linking to `name` with the linking blocks.
    /// `None` when the page has no reference index entry.
    pub async fn linked_references(&self, name: &str) -> Result<Option<Vec<Backlink>>> {
        let value = self
            .call(
                methods::GET_PAGE_LINKED_REFERENCES,
                vec![json!(normalize_page_name(name))],
            )
            .await?;
        decode_optional(value, "linked references")
    }

    /// Block by uuid including its children.
    pub async fn block(&self, uuid: &str) -> Result<Option<Block>> {
        let value = self
            .call(
                methods::GET_BLOCK,
                vec![json!(uuid), json!({ "includeChildren": true })],
            )
            .await?;
        decode_optional(value, "block")
    }

    /// Run a Datascript query. Each result row is returned as a tuple;
    /// scalar rows (from `:find ?x .` style queries) become one-element rows.
    pub async fn datascript_query(&self, query: &str, inputs: Vec<Value>) -> Result<Vec<Vec<Value>>> {
        log::debug!("datascript query: {}", query);
        let mut args = vec![json!(query)];
        args.extend(inputs);
        let value = self.call(methods::DATASCRIPT_QUERY, args).await?;
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(rows) => Ok(rows
                .into_iter()
                .map(|row| match row {
                    Value::Array(cols) => cols,
                    other => vec![other],
                })
                .collect()),
            other => Err(BridgeError::Decode(format!(
                "datascript query returned {} instead of rows",
                type_name(&other)
            ))),
        }
    }

    /// Pages from the first column of a query.
    pub async fn query_pages(&self, query: &str) -> Result<Vec<Page>> {
        self.query_first_column(query).await
    }

    /// Blocks from the first column of a query.
    pub async fn query_blocks(&self, query: &str) -> Result<Vec<Block>> {
        self.query_first_column(query).await
    }

    async fn query_first_column<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>> {
        let rows = self.datascript_query(query, Vec::new()).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(first) = row.into_iter().next() {
                if first.is_null() {
                    continue;
                }
                out.push(serde_json::from_value(first).map_err(|e| {
                    BridgeError::Decode(format!("query row: {}", e))
                })?);
            }
        }
        Ok(out)
    }
}

fn decode_optional<T: DeserializeOwned>(value: Value, what: &str) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BridgeError::Decode(format!("{}: {}", what, e)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
