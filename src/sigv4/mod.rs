//! SigV4 signing for outbound requests to IAM-protected MCP endpoints
//!
//! [`SignedFetch`] wraps any [`Fetch`] implementation and signs each request before
//! handing it to the wrapped fetch.

use thiserror::Error;

pub mod credentials;
pub mod fetch;
pub mod signer;

pub use credentials::{credentials_fn, Credentials, CredentialsFn, EnvironmentCredentials, ProvideCredentials};
pub use fetch::{Fetch, FetchError, FetchResponse, HeaderInit, ReqwestFetch, RequestInit, SignedFetch};
pub use signer::{SigV4Signer, SignableRequest};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("credentials could not be loaded: {0}")]
    CredentialsNotLoaded(String),
    #[error("request URL has no host: {0}")]
    MissingHost(String),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}
