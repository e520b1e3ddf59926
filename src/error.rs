//! The gateway-wide error type.
//!
//! Each component has its own small error enum (`ConfigError`, `TransportError`,
//! `CacheError`, ...); at the seam where a component's error becomes visible to the
//! dispatcher it is converted into [`GatewayError`], which knows how to project
//! itself onto a JSON-RPC error code and an HTTP status.

use std::fmt;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Unified error type spanning the taxonomy in the error-handling design.
#[derive(Debug)]
pub enum GatewayError {
    /// Malformed registry or rules file at startup. Fatal; callers should abort.
    Config(ConfigError),
    /// Adapter-level failure contacting an upstream.
    Transport { server: String, cause: TransportError },
    /// The breaker for `server` is open.
    BreakerOpen { server: String, retry_after_ms: u64 },
    /// `server_name` does not appear in the upstream registry.
    UnknownServer(String),
    /// `session_id` does not appear in the session table.
    UnknownSession(String),
    /// The request body was not valid JSON.
    Parse(String),
    /// The request body was valid JSON but not a valid JSON-RPC request.
    InvalidRequest(String),
    /// A downstream call exceeded its deadline.
    Timeout { server: String },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Transport { server, cause } => write!(f, "transport failure for {server}: {cause}"),
            Self::BreakerOpen { server, .. } => write!(f, "circuit breaker open for {server}"),
            Self::UnknownServer(name) => write!(f, "unknown server: {name}"),
            Self::UnknownSession(id) => write!(f, "unknown session: {id}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Timeout { server } => write!(f, "timed out calling {server}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Transport { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl GatewayError {
    /// JSON-RPC error code per the subset used by this gateway (§6).
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::UnknownServer(_) => -32601,
            Self::UnknownSession(_) => -32601,
            Self::BreakerOpen { .. } | Self::Transport { .. } | Self::Config(_) => -32000,
            Self::Timeout { .. } => -32001,
        }
    }

    /// HTTP status this error should be reported at.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Parse(_) | Self::InvalidRequest(_) => 400,
            Self::UnknownServer(_) | Self::UnknownSession(_) => 404,
            Self::BreakerOpen { .. } | Self::Transport { .. } | Self::Config(_) => 503,
            Self::Timeout { .. } => 504,
        }
    }

    /// Build the JSON-RPC error body `{code, message, data?}`. `data` never carries
    /// more than the diagnostic fields named in the error-handling design: a cause
    /// string and, for breaker rejections, a retry hint. No internal `Display` of a
    /// lower-level error escapes beyond that one `cause` string.
    pub fn to_json_rpc_error(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "code": self.json_rpc_code(),
            "message": self.message(),
        });
        if let Some(data) = self.data() {
            error["data"] = data;
        }
        error
    }

    fn message(&self) -> String {
        match self {
            Self::UnknownServer(_) => "unknown server".to_string(),
            Self::UnknownSession(_) => "unknown session".to_string(),
            Self::Parse(_) => "parse error".to_string(),
            Self::InvalidRequest(_) => "invalid request".to_string(),
            Self::BreakerOpen { .. } => "server unavailable".to_string(),
            Self::Transport { .. } => "transport failure".to_string(),
            Self::Timeout { .. } => "timed out".to_string(),
            Self::Config(e) => e.to_string(),
        }
    }

    fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::BreakerOpen { retry_after_ms, .. } => {
                Some(serde_json::json!({ "retry_after_ms": retry_after_ms }))
            }
            Self::Transport { cause, .. } => Some(serde_json::json!({ "cause": cause.to_string() })),
            _ => None,
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
