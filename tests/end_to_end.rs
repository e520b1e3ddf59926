//! Integration coverage for the literal end-to-end scenarios in the routing
//! design: breaker trip/recover and enhancement cache-hit, exercised through
//! `UpstreamRegistry`/`EnhancementMiddleware` directly (no real HTTP listener).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcp_gateway::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use mcp_gateway::cache::vector_store::VectorStoreConfig;
use mcp_gateway::cache::TwoTierCache;
use mcp_gateway::config::{ClientRule, GatewayConfig, RuleSet, UpstreamDescriptor};
use mcp_gateway::enhance::EnhancementMiddleware;
use mcp_gateway::error::GatewayError;
use mcp_gateway::inference::InferenceClient;
use mcp_gateway::registry::UpstreamRegistry;
use mcp_gateway::transport::JsonRpcRequest;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn req(id: i64) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: "tools/call".to_string(),
        params: None,
        id: Some(serde_json::json!(id)),
    }
}

#[tokio::test]
async fn unknown_server_returns_404_class_error() {
    let config = GatewayConfig {
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
    };
    let registry = UpstreamRegistry::from_config(&config);
    let err = registry.call("nope", req(7)).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnknownServer(ref name) if name == "nope"));
    assert_eq!(err.json_rpc_code(), -32601);
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn breaker_trips_after_threshold_failures_and_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/rpc")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let mut servers = HashMap::new();
    servers.insert(
        "bad".to_string(),
        UpstreamDescriptor::Http { url: format!("{}/rpc", server.uri()), health_endpoint: None, timeout_ms: 500 },
    );
    let config = GatewayConfig {
        listen_port: 9090,
        inference_url: String::new(),
        vector_store_url: String::new(),
        log_level: "info".to_string(),
        servers,
        rules: RuleSet {
            default: ClientRule { enabled: true, model: "m".to_string(), system_prompt: "s".to_string() },
            clients: HashMap::new(),
            fallback_chain: vec![],
        },
    };
    let registry = UpstreamRegistry::from_config(&config);

    for _ in 0..3 {
        let err = registry.call("bad", req(1)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    assert_eq!(registry.breakers().get("bad").unwrap().state(), CircuitState::Open);

    // Fourth call is rejected at the breaker without reaching the adapter.
    let err = registry.call("bad", req(2)).await.unwrap_err();
    assert!(matches!(err, GatewayError::BreakerOpen { .. }));
}

#[test]
fn breaker_opens_at_threshold_and_half_opens_after_recovery() {
    let breaker = CircuitBreaker::new(BreakerConfig { failure_threshold: 3, recovery_timeout: Duration::from_millis(10) });
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn enhancement_cache_hit_reports_cached_true() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "ENH(hi)" })))
        .mount(&server)
        .await;

    let inference = Arc::new(InferenceClient::new(server.uri()));
    let cache = Arc::new(TwoTierCache::new(
        1000,
        VectorStoreConfig { base_url: String::new(), ..Default::default() },
        inference.clone(),
        "embed-default",
        Duration::from_millis(50),
    ));
    let rules = RuleSet {
        default: ClientRule { enabled: true, model: "m".to_string(), system_prompt: "S".to_string() },
        clients: HashMap::new(),
        fallback_chain: vec![],
    };
    let middleware = EnhancementMiddleware::new(rules, cache, inference, Duration::from_secs(5));

    let first = middleware.enhance("hi", None).await;
    assert_eq!(first.enhanced, "ENH(hi)");
    assert!(!first.cached);

    let second = middleware.enhance("hi", None).await;
    assert_eq!(second.enhanced, "ENH(hi)");
    assert!(second.cached);
}
