#![forbid(unsafe_code)]

//! # mcp-gateway
//!
//! A local routing gateway for the Model Context Protocol (MCP). Fronts a
//! heterogeneous set of upstream MCP tool servers (stdio subprocess or HTTP),
//! enhances prompts through a local inference service with a two-tier cache,
//! and isolates callers from upstream faults with a per-upstream circuit
//! breaker.
//!
//! ## Layout
//!
//! - [`transport`] — adapters speaking JSON-RPC 2.0 to one upstream (stdio or HTTP)
//! - [`breaker`] / [`breaker_registry`] — per-upstream circuit breaker and its registry
//! - [`registry`] — owns adapters + breakers, routes calls
//! - [`inference`] — thin HTTP client for the local language-model service
//! - [`cache`] — two-tier prompt cache (exact-text L1, vector-similarity L2)
//! - [`enhance`] — per-client enhancement pipeline
//! - [`sse`] — server-sent-events session layer
//! - [`dispatcher`] — transport-agnostic core wiring the above
//! - [`observability`] — request log ring, health aggregation
//! - [`config`] — configuration loading
//! - [`error`] — the gateway-wide error type
//! - [`http`] — the `axum` HTTP surface

pub mod breaker;
pub mod breaker_registry;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod enhance;
pub mod error;
pub mod http;
pub mod inference;
pub mod observability;
pub mod registry;
pub mod sse;
pub mod transport;

pub use config::{ConfigError, GatewayConfig};
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use registry::UpstreamRegistry;
