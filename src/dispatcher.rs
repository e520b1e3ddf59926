//! Public dispatcher: transport-agnostic core wiring the upstream registry,
//! enhancement middleware, SSE session layer, and observability hooks (§4.8).
//! The HTTP surface (`http/`) is a thin translation layer in front of this.

use std::sync::Arc;
use std::time::Instant;

use crate::enhance::{EnhanceResult, EnhancementMiddleware};
use crate::error::GatewayError;
use crate::observability::{HealthReport, Observability, RequestLogEntry};
use crate::registry::UpstreamRegistry;
use crate::sse::SseSessionLayer;
use crate::transport::{JsonRpcRequest, JsonRpcResponse};

pub struct Dispatcher {
    pub registry: Arc<UpstreamRegistry>,
    pub enhancement: Arc<EnhancementMiddleware>,
    pub sse: Arc<SseSessionLayer>,
    pub observability: Arc<Observability>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        enhancement: Arc<EnhancementMiddleware>,
        sse: Arc<SseSessionLayer>,
        observability: Arc<Observability>,
    ) -> Self {
        Self { registry, enhancement, sse, observability }
    }

    /// `POST /{server}/{path}` — route to the upstream registry, recording the
    /// outcome in the request log regardless of success or failure.
    pub async fn call_upstream(
        &self,
        server: &str,
        path: &str,
        req: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, GatewayError> {
        let started = Instant::now();
        let timestamp_millis = chrono::Utc::now().timestamp_millis() as u64;
        let result = self.registry.call(server, req).await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status(),
        };
        self.observability.request_log.record(RequestLogEntry {
            timestamp_millis,
            method: "POST".to_string(),
            path: format!("/{server}/{path}"),
            status,
            latency_ms: started.elapsed().as_millis() as u64,
        });
        result
    }

    /// `POST /enhance` — always succeeds at the dispatcher level; inference
    /// failures degrade to passthrough inside the middleware itself.
    pub async fn enhance(&self, prompt: &str, client_name: Option<&str>) -> EnhanceResult {
        let started = Instant::now();
        let timestamp_millis = chrono::Utc::now().timestamp_millis() as u64;
        let result = self.enhancement.enhance(prompt, client_name).await;
        self.observability.request_log.record(RequestLogEntry {
            timestamp_millis,
            method: "POST".to_string(),
            path: "/enhance".to_string(),
            status: 200,
            latency_ms: started.elapsed().as_millis() as u64,
        });
        result
    }

    /// `GET /health` — aggregate breaker status.
    pub fn health(&self) -> HealthReport {
        self.observability.health_report(self.registry.breakers())
    }

    /// `GET /health/{server}` — per-server status; `None` if unknown.
    pub fn health_for(&self, server: &str) -> Option<crate::breaker_registry::BreakerSnapshot> {
        self.registry
            .breakers()
            .snapshot_all()
            .into_iter()
            .find(|snapshot| snapshot.name == server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::vector_store::VectorStoreConfig;
    use crate::cache::TwoTierCache;
    use crate::config::{ClientRule, GatewayConfig, RuleSet};
    use crate::inference::InferenceClient;
    use crate::observability::Observability;
    use crate::sse::{SseConfig, SseSessionLayer};
    use std::collections::HashMap;
    use std::time::Duration;

    fn empty_config() -> GatewayConfig {
        GatewayConfig {
            listen_port: 9090,
            inference_url: String::new(),
            vector_store_url: String::new(),
            log_level: "info".to_string(),
            servers: HashMap::new(),
            rules: RuleSet {
                default: ClientRule { enabled: true, model: "m".to_string(), system_prompt: "s".to_string() },
                clients: HashMap::new(),
                fallback_chain: vec![],
            },
        }
    }

    fn build_dispatcher() -> Dispatcher {
        let config = empty_config();
        let registry = Arc::new(UpstreamRegistry::from_config(&config));
        let inference = Arc::new(InferenceClient::new("http://127.0.0.1:1"));
        let cache = Arc::new(TwoTierCache::new(
            10,
            VectorStoreConfig { base_url: String::new(), ..Default::default() },
            inference.clone(),
            "embed-model",
            Duration::from_millis(50),
        ));
        let enhancement =
            Arc::new(EnhancementMiddleware::new(config.rules.clone(), cache, inference, Duration::from_secs(5)));
        let sse = Arc::new(SseSessionLayer::new(SseConfig::default()));
        let observability = Arc::new(Observability::new(50));
        Dispatcher::new(registry, enhancement, sse, observability)
    }

    #[tokio::test]
    async fn unknown_server_call_is_logged() {
        let dispatcher = build_dispatcher();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "x".to_string(),
            params: None,
            id: Some(serde_json::json!(1)),
        };
        let err = dispatcher.call_upstream("ghost", "tools/call", req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownServer(_)));
        assert_eq!(dispatcher.observability.request_log.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn health_for_unknown_server_is_none() {
        let dispatcher = build_dispatcher();
        assert!(dispatcher.health_for("ghost").is_none());
    }
}
