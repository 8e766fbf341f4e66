use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::gateway::LogseqApi;
use crate::mcp::tools::{self, ToolContext};
use crate::mcp::types::*;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP Server implementation
pub struct McpServer {
    ctx: ToolContext,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(api: LogseqApi, config: Config) -> Self {
        Self {
            ctx: ToolContext::new(api, config),
        }
    }

    /// Process an MCP JSON-RPC request (transport-agnostic)
    ///
    /// Called from both the stdio and HTTP transports.
    ///
    /// # Returns
    /// * `Ok(Some(response))` - Response to send back to client
    /// * `Ok(None)` - Notification (no response needed)
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        // Notifications carry no ID and get no response
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        if request.jsonrpc != "2.0" {
            return Ok(Some(error_response(
                &id,
                error_codes::INVALID_REQUEST,
                &format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            )));
        }

        // HTTP requests are stateless, so initialization is not enforced here
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(result_response(&id, Value::Null)),
            "ping" => Ok(result_response(&id, serde_json::json!({}))),
            _ => Ok(error_response(
                &id,
                error_codes::METHOD_NOT_FOUND,
                &format!("Unknown method: {}", request.method),
            )),
        };

        match response {
            Ok(resp) => Ok(Some(resp)),
            Err(BridgeError::McpProtocol(message)) => {
                Ok(Some(error_response(&id, error_codes::INVALID_PARAMS, &message)))
            }
            Err(e) => Ok(Some(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: id.into(),
                payload: JsonRpcResponsePayload::Error {
                    error: JsonRpcError {
                        code: error_codes::INTERNAL_ERROR,
                        message: format!("Internal error: {}", e),
                        data: Some(serde_json::json!({ "details": e.to_string() })),
                    },
                },
            })),
        }
    }

    /// Run the MCP server (reads from stdin, writes to stdout)
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdin_reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut line = String::new();
        let mut initialized = false;

        // stdout belongs to the protocol; logs go to stderr
        log::info!(
            "logseq-mcp v{} serving {} over stdio",
            env!("CARGO_PKG_VERSION"),
            self.ctx.config.logseq.api_url
        );

        loop {
            line.clear();
            let bytes_read = stdin_reader.read_line(&mut line).await?;

            // EOF - client disconnected
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    if let Some(id) = extract_id_from_line(trimmed) {
                        let error_response = JsonRpcResponse {
                            jsonrpc: "2.0".to_string(),
                            id,
                            payload: JsonRpcResponsePayload::Error {
                                error: JsonRpcError {
                                    code: error_codes::PARSE_ERROR,
                                    message: format!("Parse error: {}", e),
                                    data: None,
                                },
                            },
                        };
                        send_response(&mut stdout, &error_response).await?;
                    } else {
                        log::warn!("Dropping unparseable message: {}", e);
                    }
                    continue;
                }
            };

            match self.process_mcp_request(request, &mut initialized).await {
                Ok(Some(response)) => {
                    send_response(&mut stdout, &response).await?;
                }
                Ok(None) => {
                    if initialized {
                        log::debug!("Client initialized");
                    }
                }
                Err(e) => {
                    log::error!("Unexpected error in process_mcp_request: {}", e);
                }
            }
        }

        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or(serde_json::json!({})))
                .map_err(|e| BridgeError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({
                "tools": {}
            }),
            server_info: ServerInfo {
                name: "logseq-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(result_response(id, serde_json::to_value(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(result_response(id, serde_json::to_value(&result)?))
    }

    /// Tool failures become `isError` results; only an unknown tool or
    /// malformed call params are JSON-RPC errors.
    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| BridgeError::McpProtocol("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| BridgeError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        let result = match tools::call_tool(&self.ctx, &params.name, &params.arguments).await {
            Some(Ok(result)) => result,
            Some(Err(e)) => {
                if e.is_not_found() {
                    log::info!("{} -> {}", params.name, e);
                } else {
                    log::warn!("{} failed: {}", params.name, e);
                }
                ToolsCallResult::error(e.to_string())
            }
            None => {
                return Ok(error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    &format!("Unknown tool: {}", params.name),
                ));
            }
        };

        Ok(result_response(id, serde_json::to_value(&result)?))
    }
}

fn result_response(id: &JsonRpcId, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Result { result },
    }
}

fn error_response(id: &JsonRpcId, code: i32, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Error {
            error: JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            },
        },
    }
}

/// Send JSON-RPC response to stdout (newline-delimited)
async fn send_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Extract ID from a malformed JSON line
fn extract_id_from_line(line: &str) -> Option<Value> {
    if let Some(id_start) = line.find(r#""id":"#) {
        let id_str = &line[id_start + 5..];
        if let Some(id_end) = id_str.find([',', '}']) {
            let id_val = id_str[..id_end].trim();
            if id_val.len() >= 2 && id_val.starts_with('"') && id_val.ends_with('"') {
                return Some(Value::String(id_val[1..id_val.len() - 1].to_string()));
            } else if let Ok(num) = id_val.parse::<i64>() {
                return Some(Value::Number(num.into()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryGraph;
    use serde_json::json;

    fn server() -> McpServer {
        let mut g = MemoryGraph::new();
        g.add_page("Rust");
        g.add_block("Rust", "hello");
        McpServer::new(g.into_api(), Config::from_parts("http://127.0.0.1:12315", "token"))
    }

    async fn roundtrip(server: &McpServer, raw: Value) -> Value {
        let request: JsonRpcRequest = serde_json::from_value(raw).unwrap();
        let mut initialized = false;
        let response = server
            .process_mcp_request(request, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        serde_json::to_value(&response).unwrap()
    }

    #[test]
    fn test_extract_id_from_line() {
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(Value::String("test-123".to_string())));

        let line = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(42)));

        let line = r#"{"jsonrpc":"2.0","method":"test","id":7}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(7)));

        assert_eq!(extract_id_from_line("garbage"), None);
    }

    #[test]
    fn test_json_rpc_request_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "initialize");
        assert_eq!(request.jsonrpc, "2.0");
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server();
        let value = roundtrip(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-06-18"}}),
        )
        .await;
        assert_eq!(value["result"]["serverInfo"]["name"], "logseq-mcp");
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server();
        let request: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        let mut initialized = false;
        let response = server.process_mcp_request(request, &mut initialized).await.unwrap();
        assert!(response.is_none());
        assert!(initialized);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = server();
        let value = roundtrip(&server, json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})).await;
        assert_eq!(value["id"], "a");
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_tool_call_success_and_tool_error() {
        let server = server();
        let value = roundtrip(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "get_page", "arguments": {"page_name": "rust"}}}),
        )
        .await;
        assert!(value["result"].get("isError").is_none());
        assert!(value["result"]["content"][0]["text"].as_str().unwrap().contains("hello"));

        let value = roundtrip(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "get_page", "arguments": {"page_name": "Nope"}}}),
        )
        .await;
        assert_eq!(value["result"]["isError"], true);
        assert_eq!(value["result"]["content"][0]["text"], "Page not found: Nope");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server();
        let value = roundtrip(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(value["error"]["code"], error_codes::INVALID_PARAMS);

        let value = roundtrip(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
        assert_eq!(value["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let value = roundtrip(&server, json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call"})).await;
        assert_eq!(value["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_rejects_wrong_jsonrpc_version() {
        let server = server();
        let value = roundtrip(&server, json!({"jsonrpc": "1.0", "id": 7, "method": "tools/list"})).await;
        assert_eq!(value["error"]["code"], error_codes::INVALID_REQUEST);
    }
}
