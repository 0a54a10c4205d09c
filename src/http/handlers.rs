//! Axum HTTP handlers for the local development server
//!
//! Translates real HTTP traffic into canonical requests so the same engine that
//! serves the serverless front doors can be exercised locally.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;

use crate::http::canonical::{append_header, CanonicalHttpRequest, CanonicalHttpResponse};
use crate::mcp::handler::LambdaContext;
use crate::AppState;

static LOCAL_INVOCATIONS: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = CanonicalHttpRequest {
        method: method.as_str().to_string(),
        headers,
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned()),
    };

    let invocation = LOCAL_INVOCATIONS.fetch_add(1, Ordering::Relaxed);
    let context = LambdaContext::new(format!("local-{invocation}"), env!("CARGO_PKG_NAME"));

    into_axum_response(state.engine.handle(request, &context).await)
}

pub fn into_axum_response(response: CanonicalHttpResponse) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        append_header(&mut headers, name, value);
    }

    let mut http_response = Response::new(Body::from(response.body));
    *http_response.status_mut() =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *http_response.headers_mut() = headers;
    http_response
}
