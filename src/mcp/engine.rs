//! The MCP Streamable-HTTP transport engine
//!
//! Validates a canonical HTTP request against the Streamable-HTTP rules (POST only,
//! JSON in and out, no SSE), splits the body into JSON-RPC messages, dispatches each
//! request to the configured [`RequestHandler`] in order, and assembles the reply.
//! Nothing here keeps state between calls.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::http::{CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::handler::{LambdaContext, RequestHandler};
use crate::mcp::rpc::{ErrorKind, JsonRpcError, JsonRpcMessage, JsonRpcRequest, RequestId};

pub const ALLOW_ORIGIN: &str = "*";
pub const PREFLIGHT_METHODS: &str = "POST, GET, OPTIONS";
pub const POST_METHODS: &str = "POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Accept, Mcp-Session-Id, Mcp-Protocol-Version";
const JSON_MEDIA_TYPE: &str = "application/json";
const FALLBACK_ERROR_BODY: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to encode response body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct StreamableHttpEngine {
    handler: Arc<dyn RequestHandler>,
}

impl StreamableHttpEngine {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler }
    }

    /// Runs one request through the transport rules. Never fails: every error becomes
    /// an HTTP response carrying a JSON-RPC error body.
    pub async fn handle(
        &self,
        request: CanonicalHttpRequest,
        context: &LambdaContext,
    ) -> CanonicalHttpResponse {
        match self.process(request, context).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, request_id = %context.request_id, "mcp request failed");
                failure_response(&err)
            }
        }
    }

    async fn process(
        &self,
        request: CanonicalHttpRequest,
        context: &LambdaContext,
    ) -> Result<CanonicalHttpResponse, EngineError> {
        match request.method.as_str() {
            "OPTIONS" => return Ok(preflight_response()),
            "GET" => {
                return Ok(method_not_allowed(
                    "Method Not Allowed: SSE streaming not supported",
                ))
            }
            "POST" => {}
            other => {
                debug!(method = %other, "rejecting unsupported http method");
                return Ok(method_not_allowed("Method Not Allowed"));
            }
        }

        if !header_contains(&request, "accept", JSON_MEDIA_TYPE) {
            return Ok(transport_error(
                406,
                ErrorKind::ConnectionClosed,
                "Not Acceptable: Client must accept application/json",
            ));
        }

        if !header_contains(&request, "content-type", JSON_MEDIA_TYPE) {
            return Ok(transport_error(
                415,
                ErrorKind::ConnectionClosed,
                "Unsupported Media Type: Content-Type must be application/json",
            ));
        }

        let Some(body) = request.body.filter(|body| !body.is_empty()) else {
            return Ok(transport_error(
                400,
                ErrorKind::ParseError,
                "Parse error: Empty request body",
            ));
        };

        let payload: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "request body is not valid json");
                return Ok(transport_error(
                    400,
                    ErrorKind::ParseError,
                    "Parse error: Invalid JSON",
                ));
            }
        };

        let items = match payload {
            Value::Array(items) => items,
            single => vec![single],
        };

        let messages = if items.is_empty() {
            None
        } else {
            items
                .into_iter()
                .map(JsonRpcMessage::from_value)
                .collect::<Option<Vec<_>>>()
        };
        let Some(messages) = messages else {
            return Ok(transport_error(
                400,
                ErrorKind::InvalidRequest,
                "Invalid Request: All messages must be valid JSON-RPC 2.0",
            ));
        };

        let requests: Vec<JsonRpcRequest> = messages
            .into_iter()
            .filter_map(|message| match message {
                JsonRpcMessage::Request(request) => Some(request),
                _ => None,
            })
            .collect();

        if requests.is_empty() {
            return Ok(CanonicalHttpResponse::empty(202)
                .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN));
        }

        let mut replies = Vec::with_capacity(requests.len());
        for request in requests {
            replies.push(self.dispatch(request, context).await);
        }

        let response = if replies.len() == 1 {
            CanonicalHttpResponse::json(200, &replies[0])?
        } else {
            CanonicalHttpResponse::json(200, &replies)?
        };

        Ok(response
            .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
            .with_header("Access-Control-Allow-Methods", POST_METHODS)
            .with_header("Access-Control-Allow-Headers", ALLOW_HEADERS))
    }

    async fn dispatch(&self, request: JsonRpcRequest, context: &LambdaContext) -> JsonRpcMessage {
        let id = request.id.clone();
        let method = request.method.clone();
        let audit_params = redact_audit_params(request.params.as_ref());

        let outcome = AssertUnwindSafe(self.handler.handle_request(request, context))
            .catch_unwind()
            .await;

        let reply = match outcome {
            Ok(Ok(reply @ (JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_)))) => reply,
            Ok(Ok(other)) => {
                warn!(method = %method, kind = ?other.kind(), "handler returned a non-reply message");
                internal_error(id, "Expected JSONRPCResponse or JSONRPCError")
            }
            Ok(Err(err)) => {
                error!(method = %method, error = %err, "request handler failed");
                internal_error(id, &err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(method = %method, error = %message, "request handler panicked");
                internal_error(id, &message)
            }
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if matches!(reply, JsonRpcMessage::Error(_)) { "failure" } else { "success" },
            "mcp action audited"
        );

        reply
    }
}

fn internal_error(id: RequestId, data: &str) -> JsonRpcMessage {
    JsonRpcError::new(Some(id), ErrorKind::InternalError, "Internal error")
        .with_data(Value::String(data.to_string()))
        .into()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    }
}

fn header_contains(request: &CanonicalHttpRequest, name: &str, needle: &str) -> bool {
    request.headers.get_all(name).iter().any(|value| {
        value
            .to_str()
            .map(|value| value.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    })
}

fn error_body(error: &JsonRpcError) -> String {
    serde_json::to_string(error).unwrap_or_else(|_| FALLBACK_ERROR_BODY.to_string())
}

fn json_error_response(status_code: u16, error: &JsonRpcError) -> CanonicalHttpResponse {
    CanonicalHttpResponse {
        status_code,
        headers: Default::default(),
        body: error_body(error),
    }
    .with_header("Content-Type", JSON_MEDIA_TYPE)
    .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
}

fn transport_error(status_code: u16, kind: ErrorKind, message: &str) -> CanonicalHttpResponse {
    json_error_response(status_code, &JsonRpcError::new(None, kind, message))
}

/// The 500 reply used when the engine itself fails after validation.
fn failure_response(err: &EngineError) -> CanonicalHttpResponse {
    let error = JsonRpcError::new(None, ErrorKind::InternalError, "Internal error")
        .with_data(Value::String(err.to_string()));
    json_error_response(500, &error)
}

fn method_not_allowed(message: &str) -> CanonicalHttpResponse {
    transport_error(405, ErrorKind::ConnectionClosed, message).with_header("Allow", POST_METHODS)
}

fn preflight_response() -> CanonicalHttpResponse {
    CanonicalHttpResponse::empty(200)
        .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .with_header("Access-Control-Allow-Methods", PREFLIGHT_METHODS)
        .with_header("Access-Control-Allow-Headers", ALLOW_HEADERS)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::mcp::handler::HandlerError;
    use crate::mcp::rpc::{JsonRpcNotification, JsonRpcResponse};

    /// Answers `ok` and `echo`, fails on `boom`, panics on `panic`, and returns a
    /// notification for `confused`. Records every dispatched method.
    #[derive(Default)]
    struct ScriptedHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RequestHandler for ScriptedHandler {
        async fn handle_request(
            &self,
            request: JsonRpcRequest,
            _context: &LambdaContext,
        ) -> Result<JsonRpcMessage, HandlerError> {
            self.seen
                .lock()
                .expect("lock")
                .push(request.method.clone());
            match request.method.as_str() {
                "boom" => Err(HandlerError::new("backend exploded")),
                "panic" => panic!("handler panicked hard"),
                "confused" => Ok(JsonRpcMessage::Notification(JsonRpcNotification::new(
                    "oops", None,
                ))),
                "missing" => Ok(JsonRpcError::new(
                    Some(request.id),
                    ErrorKind::MethodNotFound,
                    "Method not found",
                )
                .into()),
                "echo" => Ok(JsonRpcResponse::new(
                    request.id,
                    request.params.unwrap_or(Value::Null),
                )
                .into()),
                _ => Ok(JsonRpcResponse::new(request.id, json!({"ok": true})).into()),
            }
        }
    }

    fn engine() -> (StreamableHttpEngine, Arc<ScriptedHandler>) {
        let handler = Arc::new(ScriptedHandler::default());
        (StreamableHttpEngine::new(handler.clone()), handler)
    }

    fn post(body: &str) -> CanonicalHttpRequest {
        CanonicalHttpRequest::from_parts(
            "POST",
            [
                ("Content-Type", "application/json"),
                ("Accept", "application/json, text/event-stream"),
            ],
            Some(body.to_string()),
        )
    }

    fn context() -> LambdaContext {
        LambdaContext::new("test-request", "test-function")
    }

    fn body_json(response: &CanonicalHttpResponse) -> Value {
        serde_json::from_str(&response.body).expect("valid json body")
    }

    #[tokio::test]
    async fn options_returns_preflight_regardless_of_body() {
        let (engine, handler) = engine();
        let mut request = post("not json at all");
        request.method = "OPTIONS".to_string();

        let response = engine.handle(request, &context()).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "");
        assert_eq!(response.headers.len(), 3);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            response.headers["Access-Control-Allow-Methods"],
            "POST, GET, OPTIONS"
        );
        assert_eq!(response.headers["Access-Control-Allow-Headers"], ALLOW_HEADERS);
        assert!(handler.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn get_is_rejected_without_streaming() {
        let (engine, _) = engine();
        let request = CanonicalHttpRequest::from_parts("GET", [("Accept", "text/event-stream")], None);

        let response = engine.handle(request, &context()).await;

        assert_eq!(response.status_code, 405);
        assert_eq!(response.headers["Allow"], "POST, OPTIONS");
        let body = body_json(&response);
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(
            body["error"]["message"],
            "Method Not Allowed: SSE streaming not supported"
        );
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let (engine, _) = engine();
        for method in ["PUT", "PATCH", "DELETE", ""] {
            let request = CanonicalHttpRequest::from_parts(method, Vec::<(String, String)>::new(), None);
            let response = engine.handle(request, &context()).await;

            assert_eq!(response.status_code, 405);
            assert_eq!(response.headers["Allow"], "POST, OPTIONS");
            assert_eq!(body_json(&response)["error"]["message"], "Method Not Allowed");
        }
    }

    #[tokio::test]
    async fn single_request_returns_bare_message() {
        let (engine, _) = engine();

        let response = engine
            .handle(post(r#"{"jsonrpc":"2.0","method":"test","id":1}"#), &context())
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, r#"{"jsonrpc":"2.0","result":{"ok":true},"id":1}"#);
        assert_eq!(response.headers["Content-Type"], "application/json");
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(response.headers["Access-Control-Allow-Methods"], "POST, OPTIONS");
        assert_eq!(response.headers["Access-Control-Allow-Headers"], ALLOW_HEADERS);
    }

    #[tokio::test]
    async fn batch_replies_in_request_order() {
        let (engine, handler) = engine();

        let response = engine
            .handle(
                post(
                    r#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","method":"notifications/progress"},{"jsonrpc":"2.0","id":2,"method":"b"}]"#,
                ),
                &context(),
            )
            .await;

        assert_eq!(response.status_code, 200);
        let body = body_json(&response);
        let replies = body.as_array().expect("batch reply");
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(*handler.seen.lock().expect("lock"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn notifications_only_are_accepted_without_body() {
        let (engine, handler) = engine();

        let response = engine
            .handle(
                post(
                    r#"[{"jsonrpc":"2.0","method":"notifications/initialized"},{"jsonrpc":"2.0","id":9,"result":{}}]"#,
                ),
                &context(),
            )
            .await;

        assert_eq!(response.status_code, 202);
        assert_eq!(response.body, "");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        assert!(handler.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn missing_accept_is_not_acceptable() {
        let (engine, _) = engine();
        let request = CanonicalHttpRequest::from_parts(
            "POST",
            [("Content-Type", "application/json")],
            Some(r#"{"jsonrpc":"2.0","method":"test","id":1}"#.to_string()),
        );

        let response = engine.handle(request, &context()).await;

        assert_eq!(response.status_code, 406);
        assert_eq!(
            body_json(&response)["error"]["message"],
            "Not Acceptable: Client must accept application/json"
        );
    }

    #[tokio::test]
    async fn wrong_content_type_is_unsupported() {
        let (engine, _) = engine();
        let request = CanonicalHttpRequest::from_parts(
            "POST",
            [("Accept", "application/json"), ("Content-Type", "text/plain")],
            Some(r#"{"jsonrpc":"2.0","method":"test","id":1}"#.to_string()),
        );

        let response = engine.handle(request, &context()).await;

        assert_eq!(response.status_code, 415);
        assert_eq!(
            body_json(&response)["error"]["message"],
            "Unsupported Media Type: Content-Type must be application/json"
        );
    }

    #[tokio::test]
    async fn header_checks_ignore_case() {
        let (engine, _) = engine();
        for (content_type, accept) in [
            ("content-type", "accept"),
            ("Content-Type", "Accept"),
            ("CONTENT-TYPE", "ACCEPT"),
        ] {
            let request = CanonicalHttpRequest::from_parts(
                "POST",
                [(content_type, "application/json"), (accept, "application/json")],
                Some(r#"{"jsonrpc":"2.0","method":"test","id":1}"#.to_string()),
            );
            let response = engine.handle(request, &context()).await;
            assert_eq!(response.status_code, 200);
        }
    }

    #[tokio::test]
    async fn empty_and_invalid_bodies_are_parse_errors() {
        let (engine, _) = engine();

        for (body, message) in [
            (None, "Parse error: Empty request body"),
            (Some(""), "Parse error: Empty request body"),
            (Some("  \n\t"), "Parse error: Invalid JSON"),
            (Some("{"), "Parse error: Invalid JSON"),
        ] {
            let mut request = post("");
            request.body = body.map(str::to_string);
            let response = engine.handle(request, &context()).await;

            assert_eq!(response.status_code, 400);
            let body = body_json(&response);
            assert_eq!(body["error"]["code"], -32700);
            assert_eq!(body["error"]["message"], message);
            assert_eq!(body["id"], Value::Null);
        }
    }

    #[tokio::test]
    async fn one_bad_item_invalidates_the_batch() {
        let (engine, handler) = engine();

        for body in [
            r#"{"hello":"world"}"#,
            r#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","bogus":true}]"#,
            "[]",
        ] {
            let response = engine.handle(post(body), &context()).await;

            assert_eq!(response.status_code, 400);
            let body = body_json(&response);
            assert_eq!(body["error"]["code"], -32600);
            assert_eq!(
                body["error"]["message"],
                "Invalid Request: All messages must be valid JSON-RPC 2.0"
            );
        }
        assert!(handler.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn malformed_ids_and_mixed_replies_are_invalid_requests() {
        let (engine, handler) = engine();

        for body in [
            r#"{"jsonrpc":"2.0","method":"x","id":null}"#,
            r#"{"jsonrpc":"2.0","id":1.5,"method":"x"}"#,
            r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":-32603,"message":"x"}}"#,
            r#"[{"jsonrpc":"2.0","method":"notifications/progress"},{"jsonrpc":"2.0","method":"x","id":{}}]"#,
        ] {
            let response = engine.handle(post(body), &context()).await;

            assert_eq!(response.status_code, 400, "body: {body}");
            assert_eq!(body_json(&response)["error"]["code"], -32600);
        }
        assert!(handler.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn transport_errors_keep_the_reply_field_order() {
        let (engine, _) = engine();

        let response = engine.handle(post("{"), &context()).await;

        assert_eq!(
            response.body,
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error: Invalid JSON"},"id":null}"#
        );
    }

    #[test]
    fn engine_failures_become_internal_server_errors() {
        let cause = serde_json::from_str::<Value>("{").expect_err("truncated json");
        let err = EngineError::from(cause);

        let response = failure_response(&err);

        assert_eq!(response.status_code, 500);
        assert_eq!(response.headers["Content-Type"], "application/json");
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        let body = body_json(&response);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["message"], "Internal error");
        assert_eq!(body["error"]["data"], err.to_string());
    }

    #[tokio::test]
    async fn failing_item_does_not_abort_siblings() {
        let (engine, handler) = engine();

        let response = engine
            .handle(
                post(
                    r#"[{"jsonrpc":"2.0","id":1,"method":"boom"},{"jsonrpc":"2.0","id":2,"method":"panic"},{"jsonrpc":"2.0","id":3,"method":"echo","params":{"x":1}}]"#,
                ),
                &context(),
            )
            .await;

        assert_eq!(response.status_code, 200);
        let body = body_json(&response);
        assert_eq!(body[0]["id"], 1);
        assert_eq!(body[0]["error"]["code"], -32603);
        assert_eq!(body[0]["error"]["message"], "Internal error");
        assert_eq!(body[0]["error"]["data"], "backend exploded");
        assert_eq!(body[1]["id"], 2);
        assert_eq!(body[1]["error"]["data"], "handler panicked hard");
        assert_eq!(body[2]["result"], json!({"x": 1}));
        assert_eq!(handler.seen.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn non_reply_from_handler_is_internal_error() {
        let (engine, _) = engine();

        let response = engine
            .handle(post(r#"{"jsonrpc":"2.0","id":"c","method":"confused"}"#), &context())
            .await;

        let body = body_json(&response);
        assert_eq!(body["id"], "c");
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["data"], "Expected JSONRPCResponse or JSONRPCError");
    }

    #[tokio::test]
    async fn handler_errors_pass_through_untouched() {
        let (engine, _) = engine();

        let response = engine
            .handle(post(r#"{"jsonrpc":"2.0","id":5,"method":"missing"}"#), &context())
            .await;

        assert_eq!(response.status_code, 200);
        let body = body_json(&response);
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["error"]["message"], "Method not found");
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "get_weather",
            "arguments": {
                "city": "Seattle",
                "token": "should-not-appear",
                "api_key": "should-not-appear",
                "nested": {
                    "client_secret": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("get_weather"));
        assert_eq!(redacted["arguments"]["city"], json!("Seattle"));
        assert_eq!(redacted["arguments"]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["client_secret"],
            json!("[REDACTED]")
        );
        assert_eq!(redact_audit_params(None), Value::Null);
    }
}
