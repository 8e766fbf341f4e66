use anyhow::{Context, Result};
use logseq_mcp::gateway::{self, methods};
use logseq_mcp::mcp::{HttpMcpServer, McpServer};
use logseq_mcp::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP stream in serve mode
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("check");

    match command {
        "serve" => run_mcp_server().await?,
        "serve-http" => run_http_server().await?,
        "check" => run_connection_check().await?,
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: logseq-mcp [serve | serve-http | check]");
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Run MCP server (stdio transport)
async fn run_mcp_server() -> Result<()> {
    let config = Config::load()?;
    let api = gateway::connect(&config)?;

    let server = McpServer::new(api, config);
    server.run().await?;

    Ok(())
}

/// Run HTTP MCP server
async fn run_http_server() -> Result<()> {
    log::info!("Starting logseq-mcp HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let api = gateway::connect(&config)?;
    let port = config.http_server.port;

    let http_server = HttpMcpServer::new(api, config)?;
    http_server.run(port).await?;

    Ok(())
}

/// Verify the Logseq API is reachable and the token is accepted
async fn run_connection_check() -> Result<()> {
    log::info!("Starting logseq-mcp v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Logseq API: {}", config.logseq.api_url);
    log::info!(
        "Datalog traversal: concept_network={}, topic_context={}",
        config.features.use_datalog_for("concept_network"),
        config.features.use_datalog_for("topic_context")
    );

    let api = gateway::connect(&config)?;
    let graph = api
        .call(methods::GET_CURRENT_GRAPH, Vec::new())
        .await
        .with_context(|| format!("Could not query Logseq at {}", config.logseq.api_url))?;

    match graph.get("name").and_then(|n| n.as_str()) {
        Some(name) => log::info!("✓ Connected to graph '{}'", name),
        None => log::warn!("Connected, but no graph is open in Logseq"),
    }

    Ok(())
}
