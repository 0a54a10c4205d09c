//! API Gateway REST API (proxy integration, payload v1) front door

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{decode_body, EventHandler};
use crate::http::{CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::{engine::StreamableHttpEngine, handler::RequestHandler};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayProxyEvent {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: Option<bool>,
    #[serde(default)]
    pub request_context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayProxyResult {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

pub struct ApiGatewayProxyEventHandler {
    engine: StreamableHttpEngine,
}

impl ApiGatewayProxyEventHandler {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            engine: StreamableHttpEngine::new(handler),
        }
    }
}

impl EventHandler for ApiGatewayProxyEventHandler {
    type Event = ApiGatewayProxyEvent;
    type Output = ApiGatewayProxyResult;

    fn engine(&self) -> &StreamableHttpEngine {
        &self.engine
    }

    fn parse_event(&self, event: ApiGatewayProxyEvent) -> CanonicalHttpRequest {
        let body = decode_body(event.body, event.is_base64_encoded.unwrap_or(false));
        let method = event.http_method.unwrap_or_default();

        match event.headers.filter(|headers| !headers.is_empty()) {
            Some(headers) => CanonicalHttpRequest::from_parts(&method, headers, body),
            None => {
                let joined = event
                    .multi_value_headers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(name, values)| (name, values.join(", ")));
                CanonicalHttpRequest::from_parts(&method, joined, body)
            }
        }
    }

    fn format_response(&self, response: CanonicalHttpResponse) -> ApiGatewayProxyResult {
        ApiGatewayProxyResult {
            status_code: response.status_code,
            headers: response.headers,
            body: response.body,
            is_base64_encoded: false,
        }
    }
}
