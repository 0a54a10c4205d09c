//! JSON-RPC 2.0 protocol representations and classification
//!
//! Messages are owned serde types with a fixed field order so bodies produced by the
//! adaptation layer are stable. Deciding *which* kind of message a JSON value is
//! defers to the MCP schema shipped with `rust-mcp-sdk`.

use std::fmt;

use rust_mcp_sdk::schema::JsonrpcMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error categories used by this crate.
///
/// `ConnectionClosed` is reused for HTTP-transport rejections (unsupported methods),
/// where the JSON-RPC code space has nothing better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ConnectionClosed,
}

impl ErrorKind {
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ConnectionClosed => -32000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Value,
    pub id: RequestId,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Error response. `id` serializes as `null` when the failing request could not be identified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub error: ErrorData,
    pub id: Option<RequestId>,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_code(id, kind.code(), message)
    }

    pub fn with_code(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error: ErrorData {
                code,
                message: message.into(),
                data: None,
            },
            id,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.error.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
    Error,
}

/// Any JSON-RPC message. Built from raw JSON through [`JsonRpcMessage::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    pub fn from_value(value: Value) -> Option<Self> {
        match classify(&value)? {
            MessageKind::Request => serde_json::from_value(value).ok().map(Self::Request),
            MessageKind::Notification => {
                serde_json::from_value(value).ok().map(Self::Notification)
            }
            MessageKind::Response => serde_json::from_value(value).ok().map(Self::Response),
            MessageKind::Error => serde_json::from_value(value).ok().map(Self::Error),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::Request,
            Self::Notification(_) => MessageKind::Notification,
            Self::Response(_) => MessageKind::Response,
            Self::Error(_) => MessageKind::Error,
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Response(value)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(value: JsonRpcError) -> Self {
        Self::Error(value)
    }
}

const REQUEST_KEYS: &[&str] = &["jsonrpc", "id", "method", "params"];
const NOTIFICATION_KEYS: &[&str] = &["jsonrpc", "method", "params"];
const RESPONSE_KEYS: &[&str] = &["jsonrpc", "id", "result"];
const ERROR_KEYS: &[&str] = &["jsonrpc", "id", "error"];

/// Decides which JSON-RPC message `value` is, or `None` when it is none of them.
///
/// Shapes are strict: a message carries exactly the keys of its kind, requests and
/// responses need an integer or string `id`, and `result`/`error` are exclusive.
pub fn classify(value: &Value) -> Option<MessageKind> {
    let object = value.as_object()?;
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return None;
    }

    let kind = shape(object)?;
    match serde_json::from_value::<JsonrpcMessage>(value.clone()) {
        Ok(message) => (schema_kind(&message) == kind).then_some(kind),
        // the schema has no room for the null id of an unattributable error
        Err(_) if kind == MessageKind::Error && object.get("id").is_some_and(Value::is_null) => {
            Some(kind)
        }
        Err(_) => None,
    }
}

fn shape(object: &Map<String, Value>) -> Option<MessageKind> {
    let kind = if object.contains_key("method") {
        if object.contains_key("id") {
            MessageKind::Request
        } else {
            MessageKind::Notification
        }
    } else {
        match (object.contains_key("result"), object.contains_key("error")) {
            (true, false) => MessageKind::Response,
            (false, true) => MessageKind::Error,
            _ => return None,
        }
    };

    let allowed = match kind {
        MessageKind::Request => REQUEST_KEYS,
        MessageKind::Notification => NOTIFICATION_KEYS,
        MessageKind::Response => RESPONSE_KEYS,
        MessageKind::Error => ERROR_KEYS,
    };
    if !object.keys().all(|key| allowed.contains(&key.as_str())) {
        return None;
    }

    let id_valid = match kind {
        MessageKind::Notification => true,
        MessageKind::Request | MessageKind::Response => {
            object.get("id").is_some_and(is_request_id)
        }
        MessageKind::Error => object
            .get("id")
            .is_some_and(|id| id.is_null() || is_request_id(id)),
    };
    id_valid.then_some(kind)
}

fn is_request_id(value: &Value) -> bool {
    value.is_string() || value.as_i64().is_some()
}

fn schema_kind(message: &JsonrpcMessage) -> MessageKind {
    match message {
        JsonrpcMessage::Request(_) => MessageKind::Request,
        JsonrpcMessage::Notification(_) => MessageKind::Notification,
        JsonrpcMessage::ResultResponse(_) => MessageKind::Response,
        JsonrpcMessage::ErrorResponse(_) => MessageKind::Error,
    }
}

pub fn is_request(value: &Value) -> bool {
    classify(value) == Some(MessageKind::Request)
}

pub fn is_notification(value: &Value) -> bool {
    classify(value) == Some(MessageKind::Notification)
}

pub fn is_response(value: &Value) -> bool {
    classify(value) == Some(MessageKind::Response)
}

pub fn is_error(value: &Value) -> bool {
    classify(value) == Some(MessageKind::Error)
}
