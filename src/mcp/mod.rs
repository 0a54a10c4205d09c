//! Model Context Protocol (MCP) transport handling and JSON-RPC representations
//!
//! Provides the JSON-RPC message model, the request handler seam, and the
//! Streamable-HTTP engine that sits between them.

pub mod engine;
pub mod handler;
pub mod rpc;
