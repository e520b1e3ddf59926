//! Upstream registry: owns `name -> adapter` and `name -> breaker`, both built
//! once at startup, and routes calls through the breaker gate (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{Admission, BreakerConfig};
use crate::breaker_registry::BreakerRegistry;
use crate::config::{GatewayConfig, UpstreamDescriptor};
use crate::error::GatewayError;
use crate::transport::http::{HttpAdapter, HttpAdapterConfig};
use crate::transport::stdio::{StdioAdapter, StdioAdapterConfig};
use crate::transport::{Adapter, JsonRpcRequest, JsonRpcResponse, TransportError};

struct Upstream {
    adapter: Arc<dyn Adapter>,
    timeout: Duration,
}

/// Read-mostly after construction: built once from config, never mutated at
/// runtime (§5, "an `Arc` over an immutable map built once at construction").
pub struct UpstreamRegistry {
    upstreams: HashMap<String, Upstream>,
    breakers: BreakerRegistry,
}

impl UpstreamRegistry {
    /// Build adapters and breakers for every configured upstream.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let breakers = BreakerRegistry::new();
        let mut upstreams = HashMap::with_capacity(config.servers.len());

        for (name, descriptor) in &config.servers {
            breakers.register(name.clone(), BreakerConfig::default());
            let timeout = Duration::from_millis(descriptor.timeout_ms());
            let adapter: Arc<dyn Adapter> = match descriptor {
                UpstreamDescriptor::Stdio { command, .. } => Arc::new(StdioAdapter::new(StdioAdapterConfig {
                    command: command.clone(),
                    ..StdioAdapterConfig::default()
                })),
                UpstreamDescriptor::Http { url, health_endpoint, .. } => {
                    Arc::new(HttpAdapter::new(HttpAdapterConfig {
                        url: url.clone(),
                        health_path: health_endpoint.clone(),
                    }))
                }
            };
            upstreams.insert(name.clone(), Upstream { adapter, timeout });
        }

        Self { upstreams, breakers }
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Route one JSON-RPC call through the named upstream's breaker and adapter
    /// following the 5-step flow in §4.3.
    pub async fn call(&self, server_name: &str, req: JsonRpcRequest) -> Result<JsonRpcResponse, GatewayError> {
        let upstream = self
            .upstreams
            .get(server_name)
            .ok_or_else(|| GatewayError::UnknownServer(server_name.to_string()))?;

        let breaker = self
            .breakers
            .get(server_name)
            .expect("every registered upstream has a breaker");

        match breaker.can_execute() {
            Admission::Go => {}
            Admission::Rejected { retry_after_ms } => {
                return Err(GatewayError::BreakerOpen { server: server_name.to_string(), retry_after_ms });
            }
        }

        match upstream.adapter.call(req, upstream.timeout).await {
            Ok(response) => {
                breaker.record_success();
                Ok(response)
            }
            Err(TransportError::Timeout(_)) => {
                breaker.record_failure();
                Err(GatewayError::Timeout { server: server_name.to_string() })
            }
            Err(cause) => {
                breaker.record_failure();
                Err(GatewayError::Transport { server: server_name.to_string(), cause })
            }
        }
    }

    /// Stop every adapter in parallel, under one overall deadline.
    pub async fn shutdown(&self, deadline: Duration) {
        let shutdowns = self.upstreams.values().map(|upstream| {
            let adapter = upstream.adapter.clone();
            async move {
                let _ = tokio::time::timeout(deadline, adapter.shutdown()).await;
            }
        });
        futures::future::join_all(shutdowns).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSet;

    fn config_with(servers: HashMap<String, UpstreamDescriptor>) -> GatewayConfig {
        GatewayConfig {
            listen_port: 9090,
            inference_url: String::new(),
            vector_store_url: String::new(),
            log_level: "info".to_string(),
            servers,
            rules: RuleSet {
                default: crate::config::ClientRule {
                    enabled: true,
                    model: "m".to_string(),
                    system_prompt: "s".to_string(),
                },
                clients: HashMap::new(),
                fallback_chain: vec![],
            },
        }
    }

    #[tokio::test]
    async fn unknown_server_is_a_gateway_error() {
        let registry = UpstreamRegistry::from_config(&config_with(HashMap::new()));
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "x".to_string(),
            params: None,
            id: Some(serde_json::json!(1)),
        };
        let err = registry.call("ghost", req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownServer(name) if name == "ghost"));
        assert_eq!(err.json_rpc_code(), -32601);
    }

    #[tokio::test]
    async fn every_registered_upstream_gets_a_breaker() {
        let mut servers = HashMap::new();
        servers.insert(
            "http-one".to_string(),
            UpstreamDescriptor::Http { url: "http://127.0.0.1:1".to_string(), health_endpoint: None, timeout_ms: 1000 },
        );
        let registry = UpstreamRegistry::from_config(&config_with(servers));
        assert!(registry.breakers().get("http-one").is_some());
        assert!(registry.breakers().get("missing").is_none());
    }
}
