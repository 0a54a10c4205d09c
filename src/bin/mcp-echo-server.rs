//! Minimal MCP server speaking newline-delimited JSON-RPC on stdin/stdout.
//!
//! Handy as a local backend for `mcp-lambda` and as a fixture for the stdio bridge.

use mcp_lambda::mcp::rpc::{
    ErrorKind, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const PROTOCOL_VERSION: &str = "2025-06-18";
const REQUESTED_FAILURE_CODE: i64 = -32001;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Value>(&line) {
            Ok(value) => match JsonRpcMessage::from_value(value) {
                Some(JsonRpcMessage::Request(request)) => Some(answer(request)),
                Some(JsonRpcMessage::Notification(notification)) => {
                    debug!(method = %notification.method, "notification received");
                    None
                }
                Some(_) => None,
                None => Some(
                    JsonRpcError::new(None, ErrorKind::InvalidRequest, "Invalid Request").into(),
                ),
            },
            Err(err) => {
                warn!(error = %err, "unparseable input line");
                Some(JsonRpcError::new(None, ErrorKind::ParseError, "Parse error").into())
            }
        };

        if let Some(reply) = reply {
            let mut encoded = serde_json::to_string(&reply)?;
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

fn answer(request: JsonRpcRequest) -> JsonRpcMessage {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;

    match method.as_str() {
        "initialize" => JsonRpcResponse::new(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": "mcp-echo-server",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .into(),
        "ping" => JsonRpcResponse::new(id, json!({})).into(),
        "echo" => JsonRpcResponse::new(id, params.unwrap_or_else(|| json!({}))).into(),
        "env" => {
            let name = params
                .as_ref()
                .and_then(|params| params.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let value = std::env::var(name).ok();
            JsonRpcResponse::new(id, json!({ "name": name, "value": value })).into()
        }
        "fail" => JsonRpcError::with_code(Some(id), REQUESTED_FAILURE_CODE, "requested failure")
            .into(),
        _ => JsonRpcError::new(Some(id), ErrorKind::MethodNotFound, "Method not found").into(),
    }
}
