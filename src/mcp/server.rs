//! MCP request dispatch.
//!
//! Transport-agnostic: the stdio loop and `POST /mcp` both hand raw
//! messages to [`McpServer::handle_message`].

use serde_json::Value;

use super::protocol::{
    error_codes, text_content, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;

pub const SERVER_NAME: &str = "avatar-overlay";

#[derive(Debug)]
pub struct McpServer {
    tools: ToolRegistry,
}

impl McpServer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one raw JSON-RPC message. `None` means nothing to send back.
    pub fn handle_message(&self, raw: &str) -> Option<Value> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable MCP message");
                return encode(JsonRpcResponse::failure(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return encode(JsonRpcResponse::failure(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };
        self.handle(request).and_then(encode)
    }

    /// Dispatch a parsed request. Notifications produce no response.
    pub fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!(method = %request.method, "MCP request");
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(serde_json::json!({ "tools": self.tools.list() })),
            "tools/call" => Ok(self.call_tool(&request.params)),
            method if method.starts_with("notifications/") => {
                return None;
            }
            method => Err((
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            )),
        };

        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::failure(id, code, message),
        })
    }

    fn initialize_result(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": crate::VERSION,
            }
        })
    }

    fn call_tool(&self, params: &Value) -> Value {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return text_content("Error: tools/call requires a tool 'name'");
        };
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        let reply = self.tools.call(name, &args);
        tracing::info!(tool = name, reply = %reply, "Tool call");
        text_content(reply)
    }
}

fn encode(response: JsonRpcResponse) -> Option<Value> {
    match serde_json::to_value(response) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode MCP response");
            None
        }
    }
}
