//! HTTP adapter: posts a serialized JSON-RPC request to the upstream URL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Adapter, JsonRpcRequest, JsonRpcResponse, TransportError};

pub struct HttpAdapterConfig {
    pub url: String,
    pub health_path: Option<String>,
}

/// Adapter for an upstream speaking MCP over HTTP. Owns a persistent
/// `reqwest::Client` exclusively (the client itself is internally pooled and
/// thread-safe, so no further locking is needed around requests).
pub struct HttpAdapter {
    client: reqwest::Client,
    config: HttpAdapterConfig,
    last_call_ok: Mutex<Option<Instant>>,
}

impl HttpAdapter {
    pub fn new(config: HttpAdapterConfig) -> Self {
        Self { client: reqwest::Client::new(), config, last_call_ok: Mutex::new(None) }
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn call(&self, req: JsonRpcRequest, deadline: Duration) -> Result<JsonRpcResponse, TransportError> {
        let send = self.client.post(&self.config.url).json(&req).timeout(deadline).send();

        let response = match tokio::time::timeout(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(TransportError::Http(e)),
            Err(_) => return Err(TransportError::Timeout(deadline)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(TransportError::Http)?;
        let parsed: JsonRpcResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Parse(e.to_string()))?;

        *self.last_call_ok.lock().await = Some(Instant::now());
        Ok(parsed)
    }

    async fn is_healthy(&self) -> bool {
        if let Some(path) = &self.config.health_path {
            let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
            return self
                .client
                .get(url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
        }

        let recent = self.last_call_ok.lock().await;
        matches!(*recent, Some(t) if t.elapsed() < Duration::from_secs(60))
    }
}
