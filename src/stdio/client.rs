//! MCP client side of the stdio transport
//!
//! Messages are newline-delimited JSON-RPC. The child's stderr is inherited so its
//! logs land next to ours.

use std::{env, io, process::Stdio, time::Duration};

use async_trait::async_trait;
use rust_mcp_sdk::schema::Implementation;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::lambda::InvokeError;
use crate::mcp::rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};
use crate::stdio::ServerLaunchSpec;

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// How long a child may take to exit after its stdin is closed before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[cfg(not(windows))]
const DEFAULT_INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to spawn MCP server `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("MCP server stdio failure: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode message for MCP server: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("MCP server closed its output before replying")]
    ConnectionClosed,
    #[error("MCP client is not connected")]
    NotConnected,
    #[error("MCP handshake failed: {0}")]
    Handshake(String),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("unexpected reply from MCP server: {0}")]
    UnexpectedReply(String),
    #[error("MCP error {code}: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

/// Client-side protocol handle.
#[async_trait]
pub trait McpClient: Send {
    /// Starts the transport and performs the MCP handshake.
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Issues one request and waits for its result. JSON-RPC errors come back as
    /// [`ClientError::Protocol`].
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError>;

    /// Releases the transport. Safe to call when `connect` failed or never ran.
    async fn close(&mut self) -> Result<(), ClientError>;
}

pub trait ClientFactory: Send + Sync {
    fn create(&self, spec: &ServerLaunchSpec) -> Box<dyn McpClient>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdioClientFactory;

impl ClientFactory for StdioClientFactory {
    fn create(&self, spec: &ServerLaunchSpec) -> Box<dyn McpClient> {
        Box::new(StdioClient::new(spec.clone()))
    }
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Connection {
    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ClientError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

pub struct StdioClient {
    spec: ServerLaunchSpec,
    connection: Option<Connection>,
    next_id: i64,
}

impl StdioClient {
    pub fn new(spec: ServerLaunchSpec) -> Self {
        Self {
            spec,
            connection: None,
            next_id: 0,
        }
    }

    fn spawn(&self) -> Result<Connection, ClientError> {
        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .env_clear()
            .envs(default_environment())
            .envs(self.spec.env.iter().flatten())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ClientError::Spawn {
            command: self.spec.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(ClientError::ConnectionClosed)?;
        let stdout = child.stdout.take().ok_or(ClientError::ConnectionClosed)?;

        Ok(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl McpClient for StdioClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        debug!(command = %self.spec.command, args = ?self.spec.args, "spawning MCP server");
        self.connection = Some(self.spawn()?);

        let result = self.request("initialize", Some(initialize_params())).await?;

        if !result.is_object() {
            return Err(ClientError::Handshake(
                "initialize result is not an object".to_string(),
            ));
        }

        info!(
            server = %result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            protocol_version = %result["protocolVersion"].as_str().unwrap_or("unknown"),
            "MCP server initialized"
        );

        let connection = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
        connection
            .send(&JsonRpcNotification::new("notifications/initialized", None))
            .await
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = RequestId::Integer(self.next_id);
        self.next_id += 1;

        let connection = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
        connection
            .send(&JsonRpcRequest::new(id.clone(), method, params))
            .await?;

        loop {
            let line = connection
                .stdout
                .next_line()
                .await?
                .ok_or(ClientError::ConnectionClosed)?;
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "skipping non-JSON output from MCP server");
                    continue;
                }
            };

            match JsonRpcMessage::from_value(value) {
                Some(JsonRpcMessage::Response(response)) if response.id == id => {
                    return Ok(response.result)
                }
                Some(JsonRpcMessage::Error(error))
                    if error.id.is_none() || error.id.as_ref() == Some(&id) =>
                {
                    return Err(ClientError::Protocol {
                        code: error.error.code,
                        message: error.error.message,
                        data: error.error.data,
                    });
                }
                Some(other) => {
                    debug!(kind = ?other.kind(), method = %method, "skipping unrelated message from MCP server")
                }
                None => warn!(method = %method, "skipping malformed JSON-RPC message from MCP server"),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        let Some(Connection {
            mut child,
            stdin,
            stdout,
        }) = self.connection.take()
        else {
            return Ok(());
        };

        drop(stdin);
        drop(stdout);

        match timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "MCP server exited");
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                warn!(grace = ?SHUTDOWN_GRACE, "MCP server did not exit after stdin closed, killing");
                child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Parameters of the `initialize` request every client sends first.
pub(crate) fn initialize_params() -> Value {
    let client_info = Implementation {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        title: None,
        description: None,
        icons: vec![],
        website_url: None,
    };

    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": client_info,
    })
}

/// The subset of this process's environment a child inherits by default.
fn default_environment() -> Vec<(String, String)> {
    DEFAULT_INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
        .filter(|(_, value)| !value.starts_with("()"))
        .collect()
}
