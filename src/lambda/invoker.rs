//! `Invoke` over the Lambda REST API, signed with SigV4

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::lambda::{InvokeError, LambdaInvoker};
use crate::sigv4::{
    Fetch, HeaderInit, ProvideCredentials, ReqwestFetch, RequestInit, SigV4Signer, SignedFetch,
};

pub const LAMBDA_SERVICE: &str = "lambda";
const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";

const FUNCTION_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionErrorPayload {
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    error_type: String,
}

/// Invokes functions through `POST /2015-03-31/functions/{name}/invocations` on any
/// [`Fetch`]. The fetch is expected to sign requests for the `lambda` service.
pub struct FetchLambdaInvoker<F> {
    endpoint: String,
    fetch: F,
}

impl<F: Fetch> FetchLambdaInvoker<F> {
    /// Targets the public regional endpoint.
    pub fn new(region: &str, fetch: F) -> Self {
        Self::with_endpoint(format!("https://lambda.{region}.amazonaws.com"), fetch)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, fetch: F) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            fetch,
        }
    }

    pub fn invocation_url(&self, function_name: &str) -> String {
        format!(
            "{}/2015-03-31/functions/{}/invocations",
            self.endpoint,
            utf8_percent_encode(function_name, FUNCTION_NAME)
        )
    }
}

impl FetchLambdaInvoker<SignedFetch<ReqwestFetch>> {
    pub fn signed(region: &str, credentials: impl ProvideCredentials + 'static) -> Self {
        let signer = SigV4Signer::new(region, LAMBDA_SERVICE, credentials);
        Self::new(region, SignedFetch::with_reqwest(signer))
    }
}

#[async_trait]
impl<F: Fetch> LambdaInvoker for FetchLambdaInvoker<F> {
    async fn invoke(&self, function_name: &str, payload: &Value) -> Result<Value, InvokeError> {
        let url = self.invocation_url(function_name);
        let init = RequestInit::new("POST")
            .with_headers(HeaderInit::Pairs(vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("x-amz-invocation-type".to_string(), "RequestResponse".to_string()),
            ]))
            .with_body(serde_json::to_vec(payload)?);

        debug!(function = %function_name, "invoking lambda function");
        let response = self.fetch.fetch(&url, init).await?;

        if !(200..300).contains(&response.status) {
            return Err(InvokeError::Status {
                status: response.status,
                body: response.text(),
            });
        }

        if let Some(kind) = response.headers.get(FUNCTION_ERROR_HEADER) {
            let details: FunctionErrorPayload = response.json().unwrap_or_default();
            let error_type = if details.error_type.is_empty() {
                kind.to_str().unwrap_or("Unhandled").to_string()
            } else {
                details.error_type
            };
            warn!(function = %function_name, error_type = %error_type, "lambda function returned an error");
            return Err(InvokeError::Function {
                function_name: function_name.to_string(),
                error_type,
                message: details.error_message,
            });
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(response.json()?)
    }
}
