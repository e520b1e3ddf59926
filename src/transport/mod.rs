//! Transport adapters: one `call(req) -> resp` operation per upstream, speaking
//! JSON-RPC 2.0 over either a stdio subprocess or an HTTP upstream.

pub mod http;
pub mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 request or notification. `id` is `None` for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// A JSON-RPC 2.0 response: either `result` or `error`, plus the echoed `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcErrorBody { code, message: message.into(), data }),
            id,
        }
    }
}

/// Adapter-level failure contacting an upstream. Distinct from a JSON-RPC `error`
/// result, which is a successful call at the transport layer (§4.2).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn subprocess: {0}")]
    SpawnFailed(std::io::Error),
    #[error("subprocess has exited (crashed)")]
    ProcessExited,
    #[error("subprocess restart budget exhausted ({restart_count}/{max_restarts})")]
    RestartBudgetExhausted { restart_count: u32, max_restarts: u32 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse upstream response as JSON-RPC: {0}")]
    Parse(String),
    #[error("upstream returned non-2xx status: {0}")]
    HttpStatus(u16),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Uniform contract every adapter (stdio or http) satisfies.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Perform one JSON-RPC call within `deadline`. The caller's `id` must be
    /// returned unmodified in the response.
    async fn call(&self, req: JsonRpcRequest, deadline: Duration) -> Result<JsonRpcResponse, TransportError>;

    /// True iff the adapter currently believes its upstream is reachable.
    async fn is_healthy(&self) -> bool;

    /// Stop the adapter (kill the subprocess, drop the client). Default no-op
    /// for adapters with nothing to tear down (§4.3 "stops all adapters in
    /// parallel" on registry shutdown).
    async fn shutdown(&self) {}
}
