use std::sync::Arc;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod http;
pub mod lambda;
pub mod logging;
pub mod mcp;
pub mod sigv4;
pub mod stdio;

use mcp::{engine::StreamableHttpEngine, handler::RequestHandler};

#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub engine: Arc<StreamableHttpEngine>,
}

impl AppState {
    pub fn new(api_token: Option<String>, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            api_token: api_token.map(Arc::<str>::from),
            engine: Arc::new(StreamableHttpEngine::new(handler)),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", any(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
