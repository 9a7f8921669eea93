//! MCP JSON-RPC protocol handler over stdio.
//!
//! Reads newline-delimited JSON-RPC 2.0 requests, answers the handshake and
//! `tools/list`, and hands `tools/call` to the [`Dispatcher`]. Requests are
//! processed one at a time; each request carrying an id gets exactly one
//! response line. Logs never go to the protocol stream.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, ToolCallRequest};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "shellmem";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;

/// Incoming JSON-RPC request or notification.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Outgoing JSON-RPC response.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Serve until the reader reaches EOF.
///
/// Only an I/O error on either stream ends the session. Malformed frames,
/// including bytes that are not UTF-8, are answered in-band and the loop
/// keeps reading.
pub async fn serve<R, W>(mut reader: R, mut writer: W, dispatcher: &Dispatcher) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("{} server running on stdio", SERVER_NAME);

    let mut frame = Vec::new();
    loop {
        frame.clear();
        if reader.read_until(b'\n', &mut frame).await? == 0 {
            break;
        }
        if let Some(resp) = process_frame(dispatcher, &frame).await {
            write_response(&mut writer, &resp).await?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Decode and answer one raw frame. `None` means nothing is written back.
async fn process_frame(dispatcher: &Dispatcher, raw: &[u8]) -> Option<JsonRpcResponse> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!("Rejected non UTF-8 frame: {}", e);
            return Some(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Invalid UTF-8: {}", e),
            ));
        }
    };
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Rejected malformed frame: {}", e);
            return Some(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Invalid JSON: {}", e),
            ));
        }
    };

    // An explicit `"id": null` is treated like a notification.
    let id = value.get("id").filter(|id| !id.is_null()).cloned();

    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(e) => {
            warn!("Rejected invalid request: {}", e);
            return Some(JsonRpcResponse::error(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                format!("Invalid Request: {}", e),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return id.map(|id| JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid JSON-RPC version"));
    }

    let response = handle_request(dispatcher, &request).await;

    // Notifications (no id) never get a response
    let id = id?;
    Some(match response {
        Some(Ok(value)) => JsonRpcResponse::success(id, value),
        Some(Err((code, message))) => JsonRpcResponse::error(id, code, message),
        None => JsonRpcResponse::error(
            id,
            INVALID_REQUEST,
            format!("{} is a notification and must not carry an id", request.method),
        ),
    })
}

type MethodResult = Result<Value, (i64, String)>;

/// Handle a single request. `None` means the method is a notification.
async fn handle_request(dispatcher: &Dispatcher, request: &JsonRpcRequest) -> Option<MethodResult> {
    match request.method.as_str() {
        "initialize" => Some(Ok(handle_initialize(&request.params))),
        "notifications/initialized" | "initialized" => {
            info!("Client sent 'initialized' notification");
            None
        }
        "notifications/cancelled" => {
            // In-flight calls run to completion; nothing to cancel.
            debug!("Ignoring cancellation: {}", request.params);
            None
        }
        "ping" => Some(Ok(json!({}))),
        "tools/list" => Some(Ok(handle_tools_list(dispatcher))),
        "tools/call" => Some(handle_tools_call(dispatcher, &request.params).await),
        other => Some(Err((METHOD_NOT_FOUND, format!("Unknown method: {}", other)))),
    }
}

fn handle_initialize(params: &Value) -> Value {
    if let Some(client) = params.get("clientInfo") {
        info!("Client connected: {}", client);
    }
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn handle_tools_list(dispatcher: &Dispatcher) -> Value {
    json!({ "tools": dispatcher.registry().list_tools() })
}

async fn handle_tools_call(dispatcher: &Dispatcher, params: &Value) -> MethodResult {
    let request = ToolCallRequest::from_params(params);
    let result = dispatcher.handle(request).await;
    serde_json::to_value(&result).map_err(|e| (INVALID_REQUEST, e.to_string()))
}

/// Write one response line and flush.
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> std::io::Result<()> {
    let mut line = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return Ok(());
        }
    };
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
