use crate::config::Config;
use crate::context::ContextBuilder;
use crate::dates::parse_date_input;
use crate::error::{BridgeError, Result};
use crate::extract::extract_context;
use crate::gateway::LogseqApi;
use crate::journal::{concept_evolution, journals_in_range};
use crate::mcp::types::{Tool, ToolsCallResult};
use crate::model::{flatten_blocks, Block};
use crate::network::{traversal_for, NetworkTraversal, Strategy};
use crate::query;
use crate::relations::{RelationKind, RelationshipSearch};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Deepest concept network a caller may request
pub const MAX_NETWORK_DEPTH: usize = 5;

/// Everything a tool handler needs
pub struct ToolContext {
    pub api: LogseqApi,
    pub config: Config,
}

impl ToolContext {
    pub fn new(api: LogseqApi, config: Config) -> Self {
        Self { api, config }
    }

    /// Traversal strategy for `operation` according to `features.use_datalog`
    pub fn traversal(&self, operation: &str) -> Box<dyn NetworkTraversal> {
        let strategy = Strategy::from_flag(self.config.features.use_datalog_for(operation));
        traversal_for(strategy, self.api.clone())
    }
}

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "get_page".to_string(),
            description: "Retrieve a Logseq page by name, with its blocks in document order".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page_name": {"type": "string", "description": "Page name (case-insensitive)"},
                    "include_blocks": {"type": "boolean", "default": true}
                },
                "required": ["page_name"]
            }),
        },
        Tool {
            name: "get_backlinks".to_string(),
            description: "List pages and blocks that reference a page".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page_name": {"type": "string", "description": "Referenced page name"}
                },
                "required": ["page_name"]
            }),
        },
        Tool {
            name: "get_block".to_string(),
            description: "Retrieve a block and its children by UUID".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "uuid": {"type": "string", "description": "Block UUID"}
                },
                "required": ["uuid"]
            }),
        },
        Tool {
            name: "search_blocks".to_string(),
            description: "Case-insensitive text search over block content".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 2},
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 200}
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "query_by_property".to_string(),
            description: "Find blocks carrying a property, optionally filtered by value".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "property": {"type": "string", "description": "Property key, e.g. status"},
                    "value": {"type": "string", "description": "Substring the value must contain"},
                    "limit": {"type": "integer", "default": 50, "minimum": 1, "maximum": 500}
                },
                "required": ["property"]
            }),
        },
        Tool {
            name: "get_concept_network".to_string(),
            description: "Breadth-first network of pages linked to or from a page, with hop depth per page".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page_name": {"type": "string"},
                    "max_depth": {"type": "integer", "default": 2, "minimum": 0, "maximum": MAX_NETWORK_DEPTH}
                },
                "required": ["page_name"]
            }),
        },
        Tool {
            name: "find_relationships".to_string(),
            description: "Explain how two pages are related: direct references, shared backlinks, or link distance".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string"},
                    "target": {"type": "string"},
                    "relation_type": {
                        "type": "string",
                        "enum": ["references", "backlinks", "connected"],
                        "default": "connected"
                    },
                    "max_distance": {"type": "integer", "default": 3, "minimum": 1, "maximum": MAX_NETWORK_DEPTH}
                },
                "required": ["source", "target"]
            }),
        },
        Tool {
            name: "build_topic_context".to_string(),
            description: "Bundle a page's blocks, related pages, references and journal date into one context".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string", "description": "Page name"}
                },
                "required": ["topic"]
            }),
        },
        Tool {
            name: "extract_context".to_string(),
            description: "Find the pages and journal dates a piece of text refers to and summarise them".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "max_concepts": {"type": "integer", "default": 5, "minimum": 1, "maximum": 20}
                },
                "required": ["text"]
            }),
        },
        Tool {
            name: "get_journals_in_range".to_string(),
            description: "Journal pages between two dates (YYYY-MM-DD or YYYYMMDD), oldest first".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"},
                    "include_blocks": {"type": "boolean", "default": true},
                    "limit": {"type": "integer", "default": 31, "minimum": 1, "maximum": 366}
                },
                "required": ["start_date", "end_date"]
            }),
        },
        Tool {
            name: "get_concept_evolution".to_string(),
            description: "Timeline of journal entries mentioning a concept".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "concept": {"type": "string"},
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"}
                },
                "required": ["concept"]
            }),
        },
    ]
}

/// Route a tools/call to its handler. `None` for unknown tool names.
pub async fn call_tool(ctx: &ToolContext, name: &str, arguments: &Value) -> Option<Result<ToolsCallResult>> {
    let result = match name {
        "get_page" => handle_get_page(ctx, arguments).await,
        "get_backlinks" => handle_get_backlinks(ctx, arguments).await,
        "get_block" => handle_get_block(ctx, arguments).await,
        "search_blocks" => handle_search_blocks(ctx, arguments).await,
        "query_by_property" => handle_query_by_property(ctx, arguments).await,
        "get_concept_network" => handle_concept_network(ctx, arguments).await,
        "find_relationships" => handle_find_relationships(ctx, arguments).await,
        "build_topic_context" => handle_topic_context(ctx, arguments).await,
        "extract_context" => handle_extract_context(ctx, arguments).await,
        "get_journals_in_range" => handle_journals_in_range(ctx, arguments).await,
        "get_concept_evolution" => handle_concept_evolution(ctx, arguments).await,
        _ => return None,
    };
    Some(result)
}

fn parse_params<T: DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
    serde_json::from_value(arguments)
        .map_err(|e| BridgeError::InvalidInput(format!("{} params: {}", tool, e)))
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn block_summary(block: &Block) -> Value {
    json!({
        "uuid": block.uuid,
        "content": block.content,
        "page_id": block.page.as_ref().map(|p| p.id),
        "properties": block.properties,
    })
}

fn default_true() -> bool { true }

#[derive(Debug, Deserialize)]
struct PageParams {
    page_name: String,
    #[serde(default = "default_true")]
    include_blocks: bool,
}

/// Handle get_page tool call
pub async fn handle_get_page(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PageParams = parse_params("get_page", arguments)?;
    require_non_empty("page_name", &params.page_name)?;

    let page = ctx
        .api
        .page(&params.page_name)
        .await?
        .ok_or_else(|| BridgeError::PageNotFound(params.page_name.clone()))?;

    let mut result = json!({
        "id": page.id,
        "name": page.display_name(),
        "uuid": page.uuid,
        "journal": page.is_journal(),
        "journal_day": page.journal_day,
        "properties": page.properties,
    });
    if params.include_blocks {
        let blocks = flatten_blocks(&ctx.api.page_blocks(&page.name).await?);
        result["block_count"] = json!(blocks.len());
        result["blocks"] = json!(blocks.iter().map(block_summary).collect::<Vec<_>>());
    }

    Ok(ToolsCallResult::json(&result)?)
}

#[derive(Debug, Deserialize)]
struct BacklinksParams {
    page_name: String,
}

/// Handle get_backlinks tool call
pub async fn handle_get_backlinks(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: BacklinksParams = parse_params("get_backlinks", arguments)?;
    require_non_empty("page_name", &params.page_name)?;

    let page = ctx
        .api
        .page(&params.page_name)
        .await?
        .ok_or_else(|| BridgeError::PageNotFound(params.page_name.clone()))?;
    let backlinks = ctx.api.linked_references(&page.name).await?.unwrap_or_default();

    let result = json!({
        "page": page.display_name(),
        "total_pages": backlinks.len(),
        "total_blocks": backlinks.iter().map(|b| b.blocks.len()).sum::<usize>(),
        "backlinks": backlinks.iter().map(|b| json!({
            "page": b.page.display_name(),
            "journal_day": b.page.journal_day,
            "blocks": b.blocks.iter().map(block_summary).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    });

    Ok(ToolsCallResult::json(&result)?)
}

#[derive(Debug, Deserialize)]
struct BlockParams {
    uuid: String,
}

/// Handle get_block tool call
pub async fn handle_get_block(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: BlockParams = parse_params("get_block", arguments)?;
    let uuid = params.uuid.trim();
    uuid::Uuid::parse_str(uuid)
        .map_err(|e| BridgeError::InvalidInput(format!("'{}' is not a block UUID: {}", uuid, e)))?;

    let block = ctx
        .api
        .block(uuid)
        .await?
        .ok_or_else(|| BridgeError::BlockNotFound(uuid.to_string()))?;

    Ok(ToolsCallResult::json(&block)?)
}

fn default_search_limit() -> usize { 20 }

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

/// Handle search_blocks tool call
pub async fn handle_search_blocks(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: SearchParams = parse_params("search_blocks", arguments)?;
    if params.query.trim().chars().count() < 2 {
        return Err(BridgeError::InvalidInput(
            "query must be at least 2 characters".to_string(),
        ));
    }

    let blocks = ctx
        .api
        .query_blocks(&query::blocks_containing(params.query.trim()))
        .await?;
    let result = json!({
        "query": params.query,
        "total": blocks.len(),
        "results": blocks.iter().take(params.limit).map(block_summary).collect::<Vec<_>>(),
    });

    Ok(ToolsCallResult::json(&result)?)
}

fn default_property_limit() -> usize { 50 }

#[derive(Debug, Deserialize)]
struct PropertyParams {
    property: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default = "default_property_limit")]
    limit: usize,
}

/// Handle query_by_property tool call
pub async fn handle_query_by_property(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PropertyParams = parse_params("query_by_property", arguments)?;
    require_non_empty("property", &params.property)?;
    if params.property.contains(char::is_whitespace) {
        return Err(BridgeError::InvalidInput(format!(
            "property '{}' must be a single key",
            params.property
        )));
    }

    let blocks = ctx
        .api
        .query_blocks(&query::blocks_with_property(&params.property, params.value.as_deref()))
        .await?;
    let result = json!({
        "property": params.property,
        "value": params.value,
        "total": blocks.len(),
        "results": blocks.iter().take(params.limit).map(block_summary).collect::<Vec<_>>(),
    });

    Ok(ToolsCallResult::json(&result)?)
}

fn default_network_depth() -> usize { 2 }

#[derive(Debug, Deserialize)]
struct NetworkParams {
    page_name: String,
    #[serde(default = "default_network_depth")]
    max_depth: usize,
}

/// Handle get_concept_network tool call
pub async fn handle_concept_network(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: NetworkParams = parse_params("get_concept_network", arguments)?;
    require_non_empty("page_name", &params.page_name)?;
    if params.max_depth > MAX_NETWORK_DEPTH {
        return Err(BridgeError::InvalidInput(format!(
            "max_depth must be at most {}",
            MAX_NETWORK_DEPTH
        )));
    }

    let traversal = ctx.traversal("concept_network");
    let network = traversal.traverse(&params.page_name, params.max_depth).await?;
    log::info!(
        "concept network '{}' depth {} via {:?}: {} nodes, {} edges",
        params.page_name,
        params.max_depth,
        network.strategy,
        network.nodes.len(),
        network.edges.len()
    );

    Ok(ToolsCallResult::json(&network)?)
}

fn default_relation_type() -> String { "connected".to_string() }
fn default_max_distance() -> usize { 3 }

#[derive(Debug, Deserialize)]
struct RelationshipParams {
    source: String,
    target: String,
    #[serde(default = "default_relation_type")]
    relation_type: String,
    #[serde(default = "default_max_distance")]
    max_distance: usize,
}

/// Handle find_relationships tool call
pub async fn handle_find_relationships(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: RelationshipParams = parse_params("find_relationships", arguments)?;
    require_non_empty("source", &params.source)?;
    require_non_empty("target", &params.target)?;

    let kind = match params.relation_type.as_str() {
        "references" => RelationKind::ContentReference,
        "backlinks" => RelationKind::Backlinks,
        "connected" => {
            if params.max_distance == 0 || params.max_distance > MAX_NETWORK_DEPTH {
                return Err(BridgeError::InvalidInput(format!(
                    "max_distance must be between 1 and {}",
                    MAX_NETWORK_DEPTH
                )));
            }
            RelationKind::Reachability { max_hops: params.max_distance }
        }
        other => {
            return Err(BridgeError::InvalidInput(format!(
                "unknown relation_type '{}' (expected references, backlinks or connected)",
                other
            )))
        }
    };

    let relationship = RelationshipSearch::new(ctx.api.clone())
        .find(&params.source, &params.target, kind)
        .await?;

    Ok(ToolsCallResult::json(&relationship)?)
}

#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: String,
}

/// Handle build_topic_context tool call
pub async fn handle_topic_context(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: TopicParams = parse_params("build_topic_context", arguments)?;
    require_non_empty("topic", &params.topic)?;

    let traversal = ctx.traversal("topic_context");
    let builder = ContextBuilder::new(ctx.api.clone(), traversal.as_ref(), ctx.config.context.clone());
    let context = builder.build(&params.topic).await?;

    Ok(ToolsCallResult::json(&context)?)
}

fn default_max_concepts() -> usize { 5 }

#[derive(Debug, Deserialize)]
struct ExtractParams {
    text: String,
    #[serde(default = "default_max_concepts")]
    max_concepts: usize,
}

/// Handle extract_context tool call
pub async fn handle_extract_context(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: ExtractParams = parse_params("extract_context", arguments)?;
    require_non_empty("text", &params.text)?;

    let extracted = extract_context(&ctx.api, &params.text, params.max_concepts.clamp(1, 20)).await?;

    Ok(ToolsCallResult::json(&extracted)?)
}

fn default_journal_limit() -> usize { 31 }

#[derive(Debug, Deserialize)]
struct JournalRangeParams {
    start_date: String,
    end_date: String,
    #[serde(default = "default_true")]
    include_blocks: bool,
    #[serde(default = "default_journal_limit")]
    limit: usize,
}

/// Handle get_journals_in_range tool call
pub async fn handle_journals_in_range(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: JournalRangeParams = parse_params("get_journals_in_range", arguments)?;
    let start = parse_date_input(&params.start_date)?;
    let end = parse_date_input(&params.end_date)?;

    let range = journals_in_range(&ctx.api, start, end, params.include_blocks, params.limit).await?;

    Ok(ToolsCallResult::json(&range)?)
}

#[derive(Debug, Deserialize)]
struct EvolutionParams {
    concept: String,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// Handle get_concept_evolution tool call
pub async fn handle_concept_evolution(ctx: &ToolContext, arguments: &Value) -> Result<ToolsCallResult> {
    let params: EvolutionParams = parse_params("get_concept_evolution", arguments)?;
    require_non_empty("concept", &params.concept)?;
    let start = params.start_date.as_deref().map(parse_date_input).transpose()?;
    let end = params.end_date.as_deref().map(parse_date_input).transpose()?;

    let evolution = concept_evolution(&ctx.api, &params.concept, start, end).await?;

    Ok(ToolsCallResult::json(&evolution)?)
}
