//! Transport-neutral HTTP request/response pair shared by every front door

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalHttpRequest {
    pub method: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl CanonicalHttpRequest {
    /// Builds a request from loosely-typed event fields.
    ///
    /// Header names that are not valid HTTP tokens are skipped rather than rejected.
    pub fn from_parts<I, K, V>(method: &str, headers: I, body: Option<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            append_header(&mut header_map, name.as_ref(), value.as_ref());
        }

        Self {
            method: method.trim().to_ascii_uppercase(),
            headers: header_map,
            body,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }
}

pub(crate) fn append_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) else {
        warn!(header = %name, "skipping header with invalid name");
        return;
    };
    let Ok(value) = HeaderValue::from_bytes(value.trim().as_bytes()) else {
        warn!(header = %name, "skipping header with invalid value");
        return;
    };
    headers.append(name, value);
}

/// Response produced by the engine. The body is always already-encoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CanonicalHttpResponse {
    pub fn empty(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status_code,
            headers: BTreeMap::new(),
            body: serde_json::to_string(body)?,
        }
        .with_header("Content-Type", "application/json"))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}
