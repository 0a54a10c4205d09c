//! Bedrock AgentCore Gateway target front door
//!
//! The gateway invokes the function with the bare tool arguments as the event and names
//! the tool in the client context as `<target>___<tool>`. The reply is the bare tool
//! result; JSON-RPC errors surface as invocation failures since there is no status channel.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::mcp::handler::{HandlerError, LambdaContext, RequestHandler};
use crate::mcp::rpc::{JsonRpcMessage, JsonRpcRequest};

pub const TOOL_NAME_KEY: &str = "bedrockAgentCoreToolName";
pub const TOOL_NAME_DELIMITER: &str = "___";
const GATEWAY_REQUEST_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum GatewayTargetError {
    #[error("Missing bedrockAgentCoreToolName in the invocation client context")]
    MissingToolName,
    #[error("Invalid bedrockAgentCoreToolName format (expected <target>___<tool>): {0}")]
    InvalidToolName(String),
    #[error("{0}")]
    Tool(String),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("Expected JSONRPCResponse or JSONRPCError")]
    UnexpectedReply,
}

pub struct BedrockAgentCoreGatewayTargetHandler {
    handler: Arc<dyn RequestHandler>,
}

impl BedrockAgentCoreGatewayTargetHandler {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler }
    }

    pub async fn handle(
        &self,
        event: Value,
        context: &LambdaContext,
    ) -> Result<Value, GatewayTargetError> {
        let qualified_name = context
            .custom(TOOL_NAME_KEY)
            .ok_or(GatewayTargetError::MissingToolName)?;
        let tool_name = parse_tool_name(qualified_name)?;

        debug!(tool = %tool_name, request_id = %context.request_id, "dispatching gateway tool call");

        let request = JsonRpcRequest::new(
            GATEWAY_REQUEST_ID,
            "tools/call",
            Some(json!({
                "name": tool_name,
                "arguments": event,
            })),
        );

        match self.handler.handle_request(request, context).await? {
            JsonRpcMessage::Response(response) => Ok(response.result),
            JsonRpcMessage::Error(error) => {
                warn!(tool = %tool_name, code = error.error.code, "gateway tool call failed");
                Err(GatewayTargetError::Tool(error.error.message))
            }
            JsonRpcMessage::Request(_) | JsonRpcMessage::Notification(_) => {
                Err(GatewayTargetError::UnexpectedReply)
            }
        }
    }
}

/// Extracts the tool name from `<target>___<tool>`, splitting on the first delimiter.
pub fn parse_tool_name(qualified_name: &str) -> Result<&str, GatewayTargetError> {
    match qualified_name.split_once(TOOL_NAME_DELIMITER) {
        Some((_, tool_name)) if !tool_name.is_empty() => Ok(tool_name),
        _ => Err(GatewayTargetError::InvalidToolName(
            qualified_name.to_string(),
        )),
    }
}
