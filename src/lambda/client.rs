use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::lambda::{LambdaFunctionParameters, LambdaInvoker};
use crate::mcp::rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};
use crate::stdio::client::{initialize_params, ClientError, McpClient};

/// MCP client whose transport is one Lambda invocation per message.
///
/// There is no session to tear down, so `close` only forgets the handshake.
pub struct LambdaFunctionClient<I> {
    parameters: LambdaFunctionParameters,
    invoker: I,
    next_id: i64,
    connected: bool,
}

impl<I: LambdaInvoker> LambdaFunctionClient<I> {
    pub fn new(parameters: LambdaFunctionParameters, invoker: I) -> Self {
        Self {
            parameters,
            invoker,
            next_id: 0,
            connected: false,
        }
    }

    pub fn parameters(&self) -> &LambdaFunctionParameters {
        &self.parameters
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = RequestId::Integer(self.next_id);
        self.next_id += 1;

        let payload = serde_json::to_value(JsonRpcRequest::new(id.clone(), method, params))?;
        let reply = self
            .invoker
            .invoke(&self.parameters.function_name, &payload)
            .await?;

        match JsonRpcMessage::from_value(reply) {
            Some(JsonRpcMessage::Response(response)) if response.id == id => Ok(response.result),
            Some(JsonRpcMessage::Error(error))
                if error.id.is_none() || error.id.as_ref() == Some(&id) =>
            {
                Err(ClientError::Protocol {
                    code: error.error.code,
                    message: error.error.message,
                    data: error.error.data,
                })
            }
            Some(other) => Err(ClientError::UnexpectedReply(format!(
                "{:?} to {method} request {id}",
                other.kind()
            ))),
            None => Err(ClientError::UnexpectedReply(format!(
                "no JSON-RPC reply to {method} request {id}"
            ))),
        }
    }
}

#[async_trait]
impl<I: LambdaInvoker> McpClient for LambdaFunctionClient<I> {
    async fn connect(&mut self) -> Result<(), ClientError> {
        debug!(function = %self.parameters.function_name, region = %self.parameters.region_name, "initializing lambda MCP server");

        let result = self.call("initialize", Some(initialize_params())).await?;
        if !result.is_object() {
            return Err(ClientError::Handshake(
                "initialize result is not an object".to_string(),
            ));
        }

        info!(
            function = %self.parameters.function_name,
            server = %result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "lambda MCP server initialized"
        );

        let notification =
            serde_json::to_value(JsonRpcNotification::new("notifications/initialized", None))?;
        self.invoker
            .invoke(&self.parameters.function_name, &notification)
            .await?;

        self.connected = true;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        self.call(method, params).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.connected = false;
        Ok(())
    }
}
