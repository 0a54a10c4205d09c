use std::{collections::HashMap, env, net::SocketAddr};

use thiserror::Error;

use crate::stdio::ServerLaunchSpec;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerLaunchSpec,
    pub api_token: Option<String>,
    pub bind_addr: String,
    pub bind_port: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MCP_SERVER_COMMAND is required and must not be empty")]
    MissingServerCommand,
    #[error("MCP_SERVER_ARGS must be a JSON array of strings: {0}")]
    InvalidServerArgs(String),
    #[error("MCP_SERVER_ENV must be a JSON object of string values: {0}")]
    InvalidServerEnv(String),
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let command = non_empty("MCP_SERVER_COMMAND").ok_or(ConfigError::MissingServerCommand)?;
        let args = non_empty("MCP_SERVER_ARGS")
            .map(|value| {
                serde_json::from_str::<Vec<String>>(&value)
                    .map_err(|err| ConfigError::InvalidServerArgs(err.to_string()))
            })
            .transpose()?
            .unwrap_or_default();
        let server_env = non_empty("MCP_SERVER_ENV")
            .map(|value| {
                serde_json::from_str::<HashMap<String, String>>(&value)
                    .map_err(|err| ConfigError::InvalidServerEnv(err.to_string()))
            })
            .transpose()?;

        let api_token = non_empty("MCP_API_TOKEN");
        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let config = Self {
            server: ServerLaunchSpec {
                command,
                args,
                env: server_env,
            },
            api_token,
            bind_addr,
            bind_port,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
