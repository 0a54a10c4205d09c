//! Lambda Function URL front door

use std::sync::Arc;

use crate::events::api_gateway_v2::{
    format_v2_response, parse_v2_event, ApiGatewayProxyEventV2, ApiGatewayProxyResultV2,
};
use crate::events::EventHandler;
use crate::http::{CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::{engine::StreamableHttpEngine, handler::RequestHandler};

pub type LambdaFunctionUrlEvent = ApiGatewayProxyEventV2;
pub type LambdaFunctionUrlResult = ApiGatewayProxyResultV2;

pub struct LambdaFunctionUrlEventHandler {
    engine: StreamableHttpEngine,
}

impl LambdaFunctionUrlEventHandler {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            engine: StreamableHttpEngine::new(handler),
        }
    }
}

impl EventHandler for LambdaFunctionUrlEventHandler {
    type Event = LambdaFunctionUrlEvent;
    type Output = LambdaFunctionUrlResult;

    fn engine(&self) -> &StreamableHttpEngine {
        &self.engine
    }

    fn parse_event(&self, event: LambdaFunctionUrlEvent) -> CanonicalHttpRequest {
        parse_v2_event(event)
    }

    fn format_response(&self, response: CanonicalHttpResponse) -> LambdaFunctionUrlResult {
        format_v2_response(response)
    }
}
