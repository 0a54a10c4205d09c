//! Request handler that answers each request through its own child MCP server

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::mcp::handler::{HandlerError, LambdaContext, RequestHandler};
use crate::mcp::rpc::{
    ErrorKind, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
};
use crate::stdio::client::{ClientError, ClientFactory, McpClient, StdioClientFactory};
use crate::stdio::ServerLaunchSpec;

pub const INTERNAL_FAILURE_MESSAGE: &str = "Internal failure, please check Lambda function logs";

pub struct StdioServerAdapter {
    spec: ServerLaunchSpec,
    factory: Arc<dyn ClientFactory>,
}

impl StdioServerAdapter {
    pub fn new(spec: ServerLaunchSpec) -> Self {
        Self::with_client_factory(spec, Arc::new(StdioClientFactory))
    }

    pub fn with_client_factory(spec: ServerLaunchSpec, factory: Arc<dyn ClientFactory>) -> Self {
        Self { spec, factory }
    }

    pub fn spec(&self) -> &ServerLaunchSpec {
        &self.spec
    }

    /// Handles any inbound JSON-RPC message.
    ///
    /// Requests are forwarded to a fresh child. Notifications are acknowledged with
    /// `None` and never start a process. Anything else is an invalid request.
    pub async fn handle_message(&self, message: Value) -> Option<JsonRpcMessage> {
        match JsonRpcMessage::from_value(message) {
            Some(JsonRpcMessage::Request(request)) => Some(self.forward(request).await),
            Some(JsonRpcMessage::Notification(notification)) => {
                debug!(method = %notification.method, "ignoring notification for stdio server");
                None
            }
            _ => Some(
                JsonRpcError::new(
                    None,
                    ErrorKind::InvalidRequest,
                    "Request is neither a request nor a notification",
                )
                .into(),
            ),
        }
    }

    /// Spawns the child, performs the handshake, forwards `request`, and always closes
    /// the client before returning.
    pub async fn forward(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let mut client = self.factory.create(&self.spec);
        let outcome = exchange(client.as_mut(), &method, params).await;

        if let Err(err) = client.close().await {
            warn!(error = %err, method = %method, "failed to close MCP server client");
        }

        match outcome {
            Ok(result) => JsonRpcResponse::new(id, result).into(),
            Err(ClientError::Protocol {
                code,
                message,
                data,
            }) => {
                debug!(method = %method, code, "MCP server answered with an error");
                let error = JsonRpcError::with_code(Some(id), code, message);
                match data {
                    Some(data) => error.with_data(data).into(),
                    None => error.into(),
                }
            }
            Err(err) => {
                error!(
                    command = %self.spec.command,
                    method = %method,
                    error = %err,
                    "stdio MCP server request failed"
                );
                JsonRpcError::new(Some(id), ErrorKind::InternalError, INTERNAL_FAILURE_MESSAGE)
                    .into()
            }
        }
    }
}

async fn exchange(
    client: &mut dyn McpClient,
    method: &str,
    params: Option<Value>,
) -> Result<Value, ClientError> {
    client.connect().await?;
    client.request(method, params).await
}

#[async_trait]
impl RequestHandler for StdioServerAdapter {
    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        _context: &LambdaContext,
    ) -> Result<JsonRpcMessage, HandlerError> {
        Ok(self.forward(request).await)
    }
}
