//! API Gateway HTTP API (payload v2) front door. Lambda Function URLs share this shape.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::events::{decode_body, EventHandler};
use crate::http::canonical::append_header;
use crate::http::{CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::{engine::StreamableHttpEngine, handler::RequestHandler};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayProxyEventV2 {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub route_key: Option<String>,
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub raw_query_string: Option<String>,
    #[serde(default)]
    pub cookies: Option<Vec<String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: Option<bool>,
    #[serde(default)]
    pub request_context: Option<RequestContextV2>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContextV2 {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub http: Option<HttpDescriptionV2>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDescriptionV2 {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayProxyResultV2 {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
}

pub(crate) fn parse_v2_event(event: ApiGatewayProxyEventV2) -> CanonicalHttpRequest {
    let method = event
        .request_context
        .and_then(|context| context.http)
        .and_then(|http| http.method)
        .unwrap_or_default();
    let body = decode_body(event.body, event.is_base64_encoded.unwrap_or(false));

    let mut request =
        CanonicalHttpRequest::from_parts(&method, event.headers.unwrap_or_default(), body);

    let cookies = event.cookies.unwrap_or_default();
    if !cookies.is_empty() && request.header("cookie").is_none() {
        append_header(&mut request.headers, "cookie", &cookies.join("; "));
    }

    request
}

pub(crate) fn format_v2_response(response: CanonicalHttpResponse) -> ApiGatewayProxyResultV2 {
    ApiGatewayProxyResultV2 {
        status_code: response.status_code,
        headers: response.headers,
        body: response.body,
        is_base64_encoded: false,
        cookies: Vec::new(),
    }
}

pub struct ApiGatewayProxyEventV2Handler {
    engine: StreamableHttpEngine,
}

impl ApiGatewayProxyEventV2Handler {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            engine: StreamableHttpEngine::new(handler),
        }
    }
}

impl EventHandler for ApiGatewayProxyEventV2Handler {
    type Event = ApiGatewayProxyEventV2;
    type Output = ApiGatewayProxyResultV2;

    fn engine(&self) -> &StreamableHttpEngine {
        &self.engine
    }

    fn parse_event(&self, event: ApiGatewayProxyEventV2) -> CanonicalHttpRequest {
        parse_v2_event(event)
    }

    fn format_response(&self, response: CanonicalHttpResponse) -> ApiGatewayProxyResultV2 {
        format_v2_response(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::events::test_support::{ping_handler, PING_BODY};
    use crate::mcp::handler::LambdaContext;

    pub(crate) fn v2_event(method: &str, body: Option<&str>) -> ApiGatewayProxyEventV2 {
        serde_json::from_value(json!({
            "version": "2.0",
            "routeKey": "POST /test",
            "rawPath": "/test",
            "rawQueryString": "",
            "headers": {"Content-Type": "application/json", "Accept": "application/json"},
            "body": body,
            "requestContext": {
                "accountId": "123456789012",
                "apiId": "test-api",
                "domainName": "test.execute-api.us-east-1.amazonaws.com",
                "domainPrefix": "test",
                "http": {
                    "method": method,
                    "path": "/test",
                    "protocol": "HTTP/1.1",
                    "sourceIp": "127.0.0.1",
                    "userAgent": "test-agent"
                },
                "requestId": "test-request",
                "routeKey": "POST /test",
                "stage": "$default",
                "time": "01/Jan/2023:00:00:00 +0000",
                "timeEpoch": 1672531200
            },
            "isBase64Encoded": false
        }))
        .expect("event should deserialize")
    }

    #[test]
    fn parses_http_api_event() {
        let handler = ApiGatewayProxyEventV2Handler::new(ping_handler());

        let parsed = handler.parse_event(v2_event("POST", Some(PING_BODY)));

        assert_eq!(parsed.method, "POST");
        assert_eq!(parsed.header("Content-Type"), Some("application/json"));
        assert_eq!(parsed.body.as_deref(), Some(PING_BODY));
    }

    #[test]
    fn parsing_is_total_without_request_context() {
        let parsed = parse_v2_event(ApiGatewayProxyEventV2::default());

        assert_eq!(parsed.method, "");
        assert!(parsed.headers.is_empty());
        assert_eq!(parsed.body, None);
    }

    #[test]
    fn folds_cookies_into_header() {
        let mut event = v2_event("POST", None);
        event.cookies = Some(vec!["a=1".to_string(), "b=2".to_string()]);

        let parsed = parse_v2_event(event);

        assert_eq!(parsed.header("Cookie"), Some("a=1; b=2"));
    }

    #[tokio::test]
    async fn successful_request() {
        let handler = ApiGatewayProxyEventV2Handler::new(ping_handler());

        let result = handler
            .handle(
                v2_event("POST", Some(PING_BODY)),
                &LambdaContext::new("test-request-id", "test-function"),
            )
            .await;

        assert_eq!(result.status_code, 200);
        assert_eq!(result.headers["Content-Type"], "application/json");
        let body: Value = serde_json::from_str(&result.body).expect("json body");
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["result"]["message"], "pong");
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn get_is_rejected() {
        let handler = ApiGatewayProxyEventV2Handler::new(ping_handler());

        let result = handler
            .handle(v2_event("GET", None), &LambdaContext::default())
            .await;

        assert_eq!(result.status_code, 405);
        assert_eq!(result.headers["Allow"], "POST, OPTIONS");
        let body: Value = serde_json::from_str(&result.body).expect("json body");
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(
            body["error"]["message"],
            "Method Not Allowed: SSE streaming not supported"
        );
    }
}
