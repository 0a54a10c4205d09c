//! Bridge from a single JSON-RPC request to a short-lived MCP server child process
//!
//! A fresh child is spawned for every request, spoken to over its standard
//! input/output, and torn down before the reply is returned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod client;

pub use adapter::{StdioServerAdapter, INTERNAL_FAILURE_MESSAGE};
pub use client::{ClientError, ClientFactory, McpClient, StdioClient, StdioClientFactory};

/// How to start the child MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overlaid on the safe default environment inherited from this process.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl ServerLaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}
