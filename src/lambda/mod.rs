//! Client side of direct Lambda invocation
//!
//! [`LambdaFunctionClient`] speaks MCP to a function whose handler is
//! [`crate::stdio::StdioServerAdapter::handle_message`]: every JSON-RPC message becomes the
//! payload of one synchronous `Invoke` call, and the function's return value is the reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sigv4::FetchError;

pub mod client;
pub mod invoker;

pub use client::LambdaFunctionClient;
pub use invoker::FetchLambdaInvoker;

/// Which function to invoke, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaFunctionParameters {
    /// Function name, partial ARN, or full ARN, optionally with a qualifier.
    pub function_name: String,
    pub region_name: String,
}

impl LambdaFunctionParameters {
    pub fn new(function_name: impl Into<String>, region_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            region_name: region_name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Lambda invoke request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Lambda invoke returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("function `{function_name}` failed ({error_type}): {message}")]
    Function {
        function_name: String,
        error_type: String,
        message: String,
    },
    #[error("invalid invoke payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Synchronous (`RequestResponse`) Lambda invocation.
#[async_trait]
pub trait LambdaInvoker: Send + Sync {
    /// Invokes `function_name` with `payload` and returns the function's decoded
    /// return value. A function that returns nothing yields `Value::Null`.
    async fn invoke(&self, function_name: &str, payload: &Value) -> Result<Value, InvokeError>;
}

#[async_trait]
impl<T: LambdaInvoker + ?Sized> LambdaInvoker for Arc<T> {
    async fn invoke(&self, function_name: &str, payload: &Value) -> Result<Value, InvokeError> {
        self.as_ref().invoke(function_name, payload).await
    }
}
