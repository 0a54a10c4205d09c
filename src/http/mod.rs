//! HTTP layer
//!
//! Canonical request/response types shared by every front door, plus the axum
//! handlers of the local development server.

pub mod canonical;
pub mod handlers;

pub use canonical::{CanonicalHttpRequest, CanonicalHttpResponse};
