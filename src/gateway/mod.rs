//! Remote Graph Gateway: method calls against Logseq's local API.
//!
//! [`GraphGateway`] is the raw `call(method, args)` seam; [`LogseqApi`]
//! layers typed primitives on top of it and is what the rest of the crate
//! talks to.

mod api;
mod http;

pub use api::LogseqApi;
pub use http::HttpGateway;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;

/// One remote-procedure call per invocation, no retry.
///
/// Returns the decoded payload as-is; `Value::Null` is a valid answer
/// (usually "not found") and is never turned into an error here.
#[async_trait]
pub trait GraphGateway: Send + Sync {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value>;
}

/// Method names of the Logseq plugin API used by this crate.
pub mod methods {
    pub const GET_PAGE: &str = "logseq.Editor.getPage";
    pub const GET_PAGE_BLOCKS_TREE: &str = "logseq.Editor.getPageBlocksTree";
    pub const GET_PAGE_LINKED_REFERENCES: &str = "logseq.Editor.getPageLinkedReferences";
    pub const GET_BLOCK: &str = "logseq.Editor.getBlock";
    pub const DATASCRIPT_QUERY: &str = "logseq.DB.datascriptQuery";
    pub const GET_CURRENT_GRAPH: &str = "logseq.App.getCurrentGraph";
}

/// HTTP-backed API for the configured Logseq instance.
pub fn connect(config: &Config) -> Result<LogseqApi> {
    let gateway = HttpGateway::new(
        &config.logseq.api_url,
        config.logseq.auth_token.clone(),
        Duration::from_secs(config.logseq.timeout_secs),
    )?;
    Ok(LogseqApi::new(Arc::new(gateway)))
}
