use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use super::protocol::{
    negotiate_protocol_version, CallToolRequest, CallToolResponse, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ServerCapabilities,
    ServerInfo, ToolListResponse, ToolsCapability, JSONRPC_VERSION,
};
use super::registry::ToolRegistry;
use crate::configuration::ServerSettings;

/// Routes JSON-RPC requests to the tool registry.
///
/// Shared by every transport and every session; it keeps no per-call state,
/// so concurrent calls are independent of each other.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    server: ServerSettings,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, server: ServerSettings) -> Self {
        Self { registry, server }
    }

    /// Handle JSON-RPC request
    pub async fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Notifications arrive without an id and must not receive a response per JSON-RPC 2.0
        if req.is_notification() {
            if req.method.starts_with("notifications/") {
                tracing::debug!("Ignoring notification: method={}", req.method);
            } else {
                tracing::warn!("Ignoring notification without id: method={}", req.method);
            }
            return None;
        }

        if req.jsonrpc != JSONRPC_VERSION {
            tracing::warn!("Rejecting request with jsonrpc={:?}", req.jsonrpc);
            return Some(JsonRpcResponse::error(req.id, JsonRpcError::invalid_request()));
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id, req.params),
            "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::from_result(req.id, &self.handle_list_tools()),
            "tools/call" => match parse_params::<CallToolRequest>(req.params) {
                Ok(call) => {
                    let result = self.handle_call_tool(&call.name, call.arguments).await;
                    JsonRpcResponse::from_result(req.id, &result)
                }
                Err(e) => JsonRpcResponse::error(req.id, e),
            },
            _ => JsonRpcResponse::error(req.id, JsonRpcError::method_not_found(&req.method)),
        };

        Some(response)
    }

    /// Handle MCP initialize method
    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::error(id, e),
        };

        tracing::info!(
            "MCP client initialized: protocol_version={}, client={}",
            params.protocol_version,
            params
                .client_info
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("unknown")
        );

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                experimental: None,
            },
            server_info: ServerInfo {
                name: self.server.name.clone(),
                version: self.server.version.clone(),
            },
            instructions: self.server.instructions.clone(),
        };

        JsonRpcResponse::from_result(id, &result)
    }

    /// Answer a discovery request with every registered tool.
    pub fn handle_list_tools(&self) -> ToolListResponse {
        let tools = self.registry.list_tools();
        tracing::debug!("Listing {} available tools", tools.len());
        ToolListResponse { tools }
    }

    /// Run a tool. Every failure comes back as an `isError` result.
    pub async fn handle_call_tool(&self, name: &str, arguments: Option<Value>) -> CallToolResponse {
        let tool_span = tracing::info_span!("mcp_tool_call", tool = %name);

        async {
            match self.registry.invoke(name, arguments).await {
                Ok(response) => {
                    tracing::info!(is_error = response.is_error, "Tool call finished");
                    response
                }
                Err(e) => {
                    tracing::warn!("Tool call rejected: {}", e);
                    CallToolResponse::error(e.to_string())
                }
            }
        }
        .instrument(tool_span)
        .await
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    match params {
        Some(p) => {
            serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
        }
        None => Err(JsonRpcError::invalid_params("Missing params")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::default_registry;
    use crate::mcp::LATEST_PROTOCOL_VERSION;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(default_registry().unwrap()),
            ServerSettings {
                name: "mcp-service-say-hello".to_string(),
                version: "1.0.0".to_string(),
                instructions: Some("Call say_hello".to_string()),
            },
        )
    }

    async fn call(method: &str, params: Option<Value>) -> JsonRpcResponse {
        dispatcher()
            .handle(JsonRpcRequest::new(1, method, params))
            .await
            .expect("requests with an id get a response")
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = call("tools/list", None).await;

        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "say_hello");
        assert!(tools[0]["inputSchema"].is_object());
        assert!(tools[0]["description"].is_string());
    }

    #[tokio::test]
    async fn test_tools_call_greets() {
        let response = call(
            "tools/call",
            Some(json!({ "name": "say_hello", "arguments": { "name": "Ada" } })),
        )
        .await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"].as_str().unwrap().contains("Ada"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_result() {
        let response = call("tools/call", Some(json!({ "name": "say_goodbye" }))).await;

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["content"][0]["text"], "unsupported tool: say_goodbye");
    }

    #[tokio::test]
    async fn test_missing_argument_is_an_error_result() {
        let response = call(
            "tools/call",
            Some(json!({ "name": "say_hello", "arguments": {} })),
        )
        .await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn test_tools_call_without_params() {
        let response = call("tools/call", None).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let notification = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };

        assert!(dispatcher().handle(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call("resources/list", None).await;

        assert_eq!(response.id, Some(json!(1)));
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let mut req = JsonRpcRequest::new(7, "ping", None);
        req.jsonrpc = "1.0".to_string();

        let response = dispatcher().handle(req).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_ping() {
        let response = call("ping", None).await;
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let response = call(
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            })),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "mcp-service-say-hello");
        assert_eq!(result["instructions"], "Call say_hello");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(false));

        let response = call(
            "initialize",
            Some(json!({ "protocolVersion": "1999-01-01", "capabilities": {} })),
        )
        .await;
        assert_eq!(
            response.result.unwrap()["protocolVersion"],
            LATEST_PROTOCOL_VERSION
        );
    }
}
