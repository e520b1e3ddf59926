//! Binary entry point: load configuration, build the dependency graph, serve.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mcp_gateway::cache::vector_store::VectorStoreConfig;
use mcp_gateway::cache::TwoTierCache;
use mcp_gateway::dispatcher::Dispatcher;
use mcp_gateway::enhance::EnhancementMiddleware;
use mcp_gateway::inference::InferenceClient;
use mcp_gateway::observability::Observability;
use mcp_gateway::sse::{SseConfig, SseSessionLayer};
use mcp_gateway::{GatewayConfig, UpstreamRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let servers_path = std::env::var("MCP_GATEWAY_SERVERS").unwrap_or_else(|_| "servers.json".to_string());
    let rules_path = std::env::var("MCP_GATEWAY_RULES").unwrap_or_else(|_| "rules.json".to_string());

    let config = GatewayConfig::load(&PathBuf::from(&servers_path), &PathBuf::from(&rules_path))
        .unwrap_or_else(|e| {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        });

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(port = config.listen_port, servers = config.servers.len(), "starting mcp-gateway");

    let registry = Arc::new(UpstreamRegistry::from_config(&config));

    let inference = Arc::new(InferenceClient::new(config.inference_url.clone()));

    let cache = Arc::new(TwoTierCache::new(
        1000,
        VectorStoreConfig { base_url: config.vector_store_url.clone(), ..VectorStoreConfig::default() },
        inference.clone(),
        "embed-default",
        Duration::from_secs(10),
    ));

    let enhancement = Arc::new(EnhancementMiddleware::new(
        config.rules.clone(),
        cache,
        inference,
        Duration::from_secs(30),
    ));

    let sse = Arc::new(SseSessionLayer::new(SseConfig::default()));
    let observability = Arc::new(Observability::new(50));

    tokio::spawn({
        let sse = sse.clone();
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                sse.sweep_idle().await;
            }
        }
    });

    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), enhancement, sse.clone(), observability));
    let app = mcp_gateway::http::build_router(dispatcher);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining upstreams");
            sse.shutdown().await;
            registry.shutdown(Duration::from_secs(10)).await;
        })
        .await?;

    Ok(())
}
