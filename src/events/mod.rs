//! Serverless front doors
//!
//! Each HTTP-shaped front door only knows how to turn its event into a
//! [`CanonicalHttpRequest`] and a [`CanonicalHttpResponse`] back into its result
//! shape; [`EventHandler::handle`] runs the shared engine in between. The gateway
//! target front door is not HTTP-shaped and lives in [`gateway_target`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::http::{CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::engine::StreamableHttpEngine;
use crate::mcp::handler::LambdaContext;

pub mod api_gateway;
pub mod api_gateway_v2;
pub mod function_url;
pub mod gateway_target;

pub use api_gateway::{ApiGatewayProxyEvent, ApiGatewayProxyEventHandler, ApiGatewayProxyResult};
pub use api_gateway_v2::{
    ApiGatewayProxyEventV2, ApiGatewayProxyEventV2Handler, ApiGatewayProxyResultV2,
};
pub use function_url::LambdaFunctionUrlEventHandler;
pub use gateway_target::{BedrockAgentCoreGatewayTargetHandler, GatewayTargetError};

#[async_trait]
pub trait EventHandler: Send + Sync {
    type Event: Send;
    type Output: Send;

    fn engine(&self) -> &StreamableHttpEngine;

    fn parse_event(&self, event: Self::Event) -> CanonicalHttpRequest;

    fn format_response(&self, response: CanonicalHttpResponse) -> Self::Output;

    async fn handle(&self, event: Self::Event, context: &LambdaContext) -> Self::Output {
        let request = self.parse_event(event);
        debug!(
            method = %request.method,
            request_id = %context.request_id,
            "handling serverless http event"
        );
        let response = self.engine().handle(request, context).await;
        self.format_response(response)
    }
}

/// Decodes a base64 body when the platform flagged it as such.
///
/// Content that does not decode to UTF-8 text is passed through unchanged.
pub(crate) fn decode_body(body: Option<String>, is_base64_encoded: bool) -> Option<String> {
    let body = body?;
    if !is_base64_encoded {
        return Some(body);
    }

    match STANDARD
        .decode(body.as_bytes())
        .map_err(|err| err.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|err| err.to_string()))
    {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, "failed to decode base64 request body; passing through");
            Some(body)
        }
    }
}
