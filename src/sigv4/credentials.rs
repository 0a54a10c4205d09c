//! Credential sources for request signing

use std::{env, fmt, future::Future};

use async_trait::async_trait;

use crate::sigv4::SigningError;

pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Resolves credentials for every signed request.
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    async fn provide_credentials(&self) -> Result<Credentials, SigningError>;
}

#[async_trait]
impl ProvideCredentials for Credentials {
    async fn provide_credentials(&self) -> Result<Credentials, SigningError> {
        Ok(self.clone())
    }
}

/// Reads the standard AWS variables on each call, so rotated credentials are picked up.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentCredentials;

#[async_trait]
impl ProvideCredentials for EnvironmentCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, SigningError> {
        let access_key_id = required_var(ACCESS_KEY_ID_VAR)?;
        let secret_access_key = required_var(SECRET_ACCESS_KEY_VAR)?;
        let session_token = env::var(SESSION_TOKEN_VAR)
            .ok()
            .filter(|value| !value.is_empty());

        Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn required_var(name: &str) -> Result<String, SigningError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(SigningError::CredentialsNotLoaded(format!(
            "environment variable {name} is not set"
        ))),
    }
}

/// Credentials resolved by an async closure.
pub struct CredentialsFn<F> {
    resolve: F,
}

pub fn credentials_fn<F, Fut>(resolve: F) -> CredentialsFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, SigningError>> + Send,
{
    CredentialsFn { resolve }
}

#[async_trait]
impl<F, Fut> ProvideCredentials for CredentialsFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, SigningError>> + Send,
{
    async fn provide_credentials(&self) -> Result<Credentials, SigningError> {
        (self.resolve)().await
    }
}
