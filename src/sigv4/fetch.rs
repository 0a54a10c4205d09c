//! Fetch abstraction and the signing wrapper around it

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::sigv4::signer::{SigV4Signer, SignableRequest};
use crate::sigv4::SigningError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Request headers in any of the shapes callers commonly hold them.
#[derive(Debug, Clone, Default)]
pub enum HeaderInit {
    #[default]
    None,
    Map(HeaderMap),
    Pairs(Vec<(String, String)>),
    Object(BTreeMap<String, String>),
}

impl HeaderInit {
    pub fn into_header_map(self) -> Result<HeaderMap, FetchError> {
        match self {
            Self::None => Ok(HeaderMap::new()),
            Self::Map(headers) => Ok(headers),
            Self::Pairs(pairs) => collect_headers(pairs),
            Self::Object(object) => collect_headers(object),
        }
    }
}

fn collect_headers<I>(entries: I) -> Result<HeaderMap, FetchError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in entries {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| FetchError::InvalidHeader(format!("{name}: {err}")))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|err| FetchError::InvalidHeader(format!("{name}: {err}")))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

impl From<HeaderMap> for HeaderInit {
    fn from(headers: HeaderMap) -> Self {
        Self::Map(headers)
    }
}

impl From<Vec<(String, String)>> for HeaderInit {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Pairs(pairs)
    }
}

impl From<BTreeMap<String, String>> for HeaderInit {
    fn from(object: BTreeMap<String, String>) -> Self {
        Self::Object(object)
    }
}

impl From<HashMap<String, String>> for HeaderInit {
    fn from(object: HashMap<String, String>) -> Self {
        Self::Object(object.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    /// Defaults to `GET`.
    pub method: Option<String>,
    pub headers: HeaderInit,
    pub body: Option<Vec<u8>>,
}

impl RequestInit {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn with_headers(mut self, headers: impl Into<HeaderInit>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, init: RequestInit) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    async fn fetch(&self, url: &str, init: RequestInit) -> Result<FetchResponse, FetchError> {
        self.as_ref().fetch(url, init).await
    }
}

/// Signs every request with SigV4 and delegates to the wrapped fetch.
///
/// Signing failures surface as [`FetchError::Signing`]; errors from the wrapped fetch
/// are returned as they are.
pub struct SignedFetch<F> {
    signer: SigV4Signer,
    inner: F,
}

impl<F: Fetch> SignedFetch<F> {
    pub fn new(signer: SigV4Signer, inner: F) -> Self {
        Self { signer, inner }
    }

    pub fn signer(&self) -> &SigV4Signer {
        &self.signer
    }
}

impl SignedFetch<ReqwestFetch> {
    pub fn with_reqwest(signer: SigV4Signer) -> Self {
        Self::new(signer, ReqwestFetch::default())
    }
}

#[async_trait]
impl<F: Fetch> Fetch for SignedFetch<F> {
    async fn fetch(&self, url: &str, init: RequestInit) -> Result<FetchResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let method = init.method.unwrap_or_else(|| "GET".to_string());
        let mut request = SignableRequest::new(method, parsed)
            .with_headers(init.headers.into_header_map()?);
        request.body = init.body;

        self.signer.sign(&mut request).await?;
        debug!(method = %request.method, url = %url, "dispatching signed request");

        let SignableRequest {
            method,
            headers,
            body,
            ..
        } = request;
        self.inner
            .fetch(
                url,
                RequestInit {
                    method: Some(method),
                    headers: HeaderInit::Map(headers),
                    body,
                },
            )
            .await
    }
}

/// Base fetch backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, url: &str, init: RequestInit) -> Result<FetchResponse, FetchError> {
        let method_name = init.method.unwrap_or_else(|| "GET".to_string());
        let method = reqwest::Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidMethod(method_name.clone()))?;

        let mut builder = self
            .client
            .request(method, url)
            .headers(init.headers.into_header_map()?);
        if let Some(body) = init.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
