use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::mcp::server::McpServer;
use crate::mcp::types::*;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// HTTP MCP Server wrapper
pub struct HttpMcpServer {
    server: Arc<McpServer>,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
}

impl HttpMcpServer {
    /// Create a new HTTP MCP server. Outside authless mode the bearer key is
    /// read from the environment variable named by `http_server.api_key_env`.
    pub fn new(api: LogseqApi, config: Config) -> Result<Self> {
        let api_key = if config.http_server.authless {
            String::new()
        } else {
            std::env::var(&config.http_server.api_key_env).map_err(|_| {
                BridgeError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.http_server.api_key_env
                ))
            })?
        };

        Ok(Self {
            allowed_origins: config.http_server.allowed_origins.clone(),
            authless: config.http_server.authless,
            server: Arc::new(McpServer::new(api, config)),
            api_key,
        })
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(BridgeError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in the config file.",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            BridgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting HTTP MCP server on http://{}", addr);
        log::info!("MCP endpoint: http://{}/mcp", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        axum::serve(listener, self.create_router())
            .await
            .map_err(|e| BridgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("HTTP server error: {}", e))))
    }

    fn create_router(&self) -> Router {
        // Preflight answers must agree with the origin check in handle_post
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let state = AppState {
            server: Arc::clone(&self.server),
            api_key: self.api_key.clone(),
            allowed_origins: self.allowed_origins.clone(),
            authless: self.authless,
        };

        Router::new()
            .route("/mcp", post(handle_post))
            .route("/.well-known/mcp.json", get(handle_discovery))
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
}

/// Handle POST requests carrying one JSON-RPC message
async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    if !state.authless {
        if let Err(response) = validate_auth(&headers, &state.api_key) {
            return response;
        }
        if let Err(response) = validate_origin(&headers, &state.allowed_origins) {
            return response;
        }
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: serde_json::Value::Null,
                    payload: JsonRpcResponsePayload::Error {
                        error: JsonRpcError {
                            code: error_codes::PARSE_ERROR,
                            message: format!("Parse error: {}", e),
                            data: None,
                        },
                    },
                }),
            )
                .into_response();
        }
    };

    // Each HTTP request stands alone; initialization is not tracked
    let mut initialized = false;
    match state.server.process_mcp_request(request, &mut initialized).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            log::error!("Error processing MCP request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "details": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// Server metadata for client discovery
async fn handle_discovery(State(state): State<AppState>) -> Response {
    let mut discovery = serde_json::json!({
        "name": "logseq-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "transport": {
            "type": "http",
            "endpoint": "/mcp"
        }
    });

    if state.authless {
        discovery["authentication"] = serde_json::json!({ "type": "none" });
    } else {
        discovery["authentication"] = serde_json::json!({ "type": "bearer" });
    }

    (StatusCode::OK, Json(discovery)).into_response()
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "logseq-mcp",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing Authorization header",
                    "message": "Use 'Authorization: Bearer <api-key>' header"
                })),
            )
                .into_response()
        })?;

    let Some(provided_key) = auth_header.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format",
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response());
    };

    if expected_key.is_empty() || provided_key != expected_key {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid API key" })),
        )
            .into_response());
    }

    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Non-browser clients send no Origin
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
