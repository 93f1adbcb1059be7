//! MCP stdio server.
//!
//! One JSON-RPC 2.0 message per line on stdin, one response per line on
//! stdout. Only the tool methods are offered; they map onto [`TaskTools`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::tools::{TaskTools, ToolError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "crew";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::Internal => -32603,
        }
    }
}

impl RpcResponse {
    pub fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(id: Option<Value>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code: code.code(),
                message: message.into(),
                data: None,
            }),
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.data = Some(data);
        }
        self
    }
}

/// Content of a `tools/call` result. Tool failures are reported here with
/// `isError` set rather than as protocol errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub content: Vec<CallContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallContent {
    Text { text: String },
}

impl CallResult {
    fn from_outcome(outcome: Result<Value, ToolError>) -> Self {
        let (text, is_error) = match outcome {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => (text, false),
                Err(err) => (err.to_string(), true),
            },
            Err(err) => (err.to_string(), true),
        };
        Self {
            content: vec![CallContent::Text { text }],
            is_error,
        }
    }
}

pub struct McpServer {
    tools: TaskTools,
    initialized: bool,
}

impl McpServer {
    pub fn new(tools: TaskTools) -> Self {
        Self {
            tools,
            initialized: false,
        }
    }

    pub async fn run_stdio(&mut self) -> std::io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Answer requests from `reader` until it reaches EOF.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(reply) = self.handle_line(&line).await else {
                continue;
            };
            let mut encoded = match serde_json::to_string(&reply) {
                Ok(encoded) => encoded,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode mcp response");
                    continue;
                }
            };
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
        tracing::info!("mcp client disconnected");
        Ok(())
    }

    /// Decode one line and answer it. Blank lines and notifications get no reply.
    pub async fn handle_line(&mut self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                return Some(
                    RpcResponse::fail(None, ErrorCode::ParseError, "Parse error")
                        .with_data(json!({ "reason": err.to_string() })),
                );
            }
        };
        let request: RpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return Some(
                    RpcResponse::fail(None, ErrorCode::InvalidRequest, "Invalid request")
                        .with_data(json!({ "reason": err.to_string() })),
                );
            }
        };

        let notification = request.id.is_none();
        let response = self.dispatch(request).await;
        (!notification).then_some(response)
    }

    pub async fn dispatch(&mut self, request: RpcRequest) -> RpcResponse {
        tracing::debug!(method = %request.method, "mcp request");
        let RpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        if jsonrpc != "2.0" {
            return RpcResponse::fail(id, ErrorCode::InvalidRequest, "jsonrpc must be \"2.0\"");
        }
        let params = params.unwrap_or_else(|| json!({}));

        match method.as_str() {
            "initialize" => self.initialize(id, &params),
            "initialized" | "notifications/initialized" => {
                self.initialized = true;
                RpcResponse::ok(id, Value::Null)
            }
            "ping" => RpcResponse::ok(id, json!({})),
            "tools/list" | "tools/call" if !self.initialized => {
                RpcResponse::fail(id, ErrorCode::InvalidRequest, "initialize first")
            }
            "tools/list" => RpcResponse::ok(id, json!({ "tools": self.tools.definitions() })),
            "tools/call" => self.call_tool(id, &params).await,
            other => RpcResponse::fail(
                id,
                ErrorCode::MethodNotFound,
                format!("unknown method '{other}'"),
            ),
        }
    }

    fn initialize(&mut self, id: Option<Value>, params: &Value) -> RpcResponse {
        if !params.is_object() {
            return RpcResponse::fail(id, ErrorCode::InvalidParams, "params must be an object");
        }
        self.initialized = true;
        tracing::info!("mcp client initialized");
        RpcResponse::ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": { "listChanged": false } },
            }),
        )
    }

    async fn call_tool(&self, id: Option<Value>, params: &Value) -> RpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::fail(id, ErrorCode::InvalidParams, "missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let outcome = self.tools.call(name, arguments).await;
        match &outcome {
            Err(ToolError::UnknownTool { name }) => {
                return RpcResponse::fail(id, ErrorCode::MethodNotFound, "unknown tool")
                    .with_data(json!({ "name": name }));
            }
            Err(err) => tracing::warn!(tool = name, error = %err, "tool call failed"),
            Ok(_) => {}
        }

        match serde_json::to_value(CallResult::from_outcome(outcome)) {
            Ok(result) => RpcResponse::ok(id, result),
            Err(err) => RpcResponse::fail(id, ErrorCode::Internal, err.to_string()),
        }
    }
}
