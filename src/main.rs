use std::sync::Arc;

use mcp_lambda::{build_app, config::Config, logging, stdio::StdioServerAdapter, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;

    let bind_socket = config.bind_socket()?;
    let adapter = Arc::new(StdioServerAdapter::new(config.server.clone()));
    let state = AppState::new(config.api_token.clone(), adapter);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        server_command = %config.server.command,
        auth_enabled = config.api_token.is_some(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
