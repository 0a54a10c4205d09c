//! The pluggable backend seam between the transport engine and whatever answers requests

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::mcp::rpc::{JsonRpcMessage, JsonRpcRequest};

/// Invocation metadata supplied by the hosting platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaContext {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub client_context: Option<ClientContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientContext {
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl LambdaContext {
    pub fn new(request_id: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            function_name: function_name.into(),
            client_context: None,
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_context
            .get_or_insert_with(ClientContext::default)
            .custom
            .insert(key.into(), value.into());
        self
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.client_context
            .as_ref()
            .and_then(|context| context.custom.get(key))
            .map(String::as_str)
    }
}

/// An unexpected failure inside a handler.
///
/// Business-logic failures are not errors at this level: they are answered with a
/// JSON-RPC error message instead.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Answers one JSON-RPC request.
///
/// Implementations should reply with either [`JsonRpcMessage::Response`] or
/// [`JsonRpcMessage::Error`]; callers treat any other variant as a malformed reply.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        context: &LambdaContext,
    ) -> Result<JsonRpcMessage, HandlerError>;
}
