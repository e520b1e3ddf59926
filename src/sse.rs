//! SSE session layer: translates long-lived client streams into calls against
//! the public dispatcher (§4.7). Each session owns its own inbound/outbound
//! channels; sessions are independent of one another, so no global broadcast
//! is used (a deliberate departure from a single shared event bus).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::registry::UpstreamRegistry;
use crate::transport::JsonRpcRequest;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SseEvent {
    #[serde(rename = "session")]
    Opened { session_id: String, messages_url: String },
    #[serde(rename = "response")]
    Response(serde_json::Value),
    #[serde(rename = "close")]
    Closed,
}

struct Session {
    outbound: mpsc::Sender<SseEvent>,
    inbound: mpsc::Sender<(String, JsonRpcRequest)>,
    last_activity: Mutex<Instant>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session table is at capacity ({0})")]
    AtCapacity(usize),
    #[error("unknown session: {0}")]
    Unknown(String),
}

/// Configuration for session limits (§3, §5 resource limits).
#[derive(Debug, Clone, Copy)]
pub struct SseConfig {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self { max_sessions: 1000, idle_timeout: Duration::from_secs(5 * 60) }
    }
}

pub struct SseSessionLayer {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    config: SseConfig,
}

impl SseSessionLayer {
    pub fn new(config: SseConfig) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), config }
    }

    /// Allocate a session, returning its id, the receiver side of its outbound
    /// event stream, and the receiver side of its inbound request queue. The
    /// first event on the outbound stream always carries the session id and
    /// the `post_message` URL (§4.7). The caller is responsible for driving
    /// the inbound receiver — typically by spawning [`Self::run_session`].
    pub async fn open(
        &self,
        messages_base_url: &str,
    ) -> Result<(String, mpsc::Receiver<SseEvent>, mpsc::Receiver<(String, JsonRpcRequest)>), SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::AtCapacity(self.config.max_sessions));
        }

        let session_id = Uuid::new_v4().to_string();
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let (inbound_tx, inbound_rx) = mpsc::channel(32);

        let session = Arc::new(Session {
            outbound: outbound_tx.clone(),
            inbound: inbound_tx,
            last_activity: Mutex::new(Instant::now()),
        });
        sessions.insert(session_id.clone(), session);

        let messages_url = format!("{}?session={}", messages_base_url, session_id);
        let _ = outbound_tx
            .send(SseEvent::Opened { session_id: session_id.clone(), messages_url })
            .await;

        Ok((session_id, outbound_rx, inbound_rx))
    }

    /// Enqueue a request on `session_id`'s worker. The response is dispatched
    /// through `registry` and emitted as an SSE event on the session's stream,
    /// in the order calls *complete*, not the order they arrived (§4.7).
    pub async fn post_message(
        &self,
        session_id: &str,
        server_name: String,
        req: JsonRpcRequest,
    ) -> Result<(), SessionError> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.get(session_id).cloned().ok_or_else(|| SessionError::Unknown(session_id.to_string()))?;
            *session.last_activity.lock().await = Instant::now();
            session
        };

        session
            .inbound
            .send((server_name, req))
            .await
            .map_err(|_| SessionError::Unknown(session_id.to_string()))
    }

    /// Drive one session's inbound queue against `registry` until the queue's
    /// sender side is dropped (session closed) or the outbound channel is gone
    /// (client disconnected). The caller spawns this as its own task right
    /// after `open()` succeeds, passing the inbound receiver `open()` handed
    /// back — this is the session's worker (§4.7).
    pub async fn run_session(
        &self,
        session_id: String,
        registry: Arc<UpstreamRegistry>,
        mut inbound: mpsc::Receiver<(String, JsonRpcRequest)>,
    ) {
        while let Some((server_name, req)) = inbound.recv().await {
            let id = req.id.clone();
            let event = match registry.call(&server_name, req).await {
                Ok(response) => serde_json::to_value(response).unwrap_or_default(),
                Err(err) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": err.to_json_rpc_error(),
                    "id": id,
                }),
            };

            let outbound = {
                let sessions = self.sessions.lock().await;
                match sessions.get(&session_id) {
                    Some(session) => session.outbound.clone(),
                    None => break,
                }
            };
            if outbound.send(SseEvent::Response(event)).await.is_err() {
                break;
            }
        }

        self.close(&session_id).await;
    }

    /// Evict sessions idle past the configured timeout. Spawned as a periodic
    /// background task from `main` (§4.7 idle eviction).
    pub async fn sweep_idle(&self) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            let last_activity = *session.last_activity.lock().await;
            if now.duration_since(last_activity) >= self.config.idle_timeout {
                expired.push(id.clone());
            }
        }
        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                let _ = session.outbound.send(SseEvent::Closed).await;
            }
        }
    }

    async fn close(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.remove(session_id) {
            let _ = session.outbound.send(SseEvent::Closed).await;
        }
    }

    /// Graceful shutdown: emit a terminal event on every open session.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, session) in sessions.drain() {
            let _ = session.outbound.send(SseEvent::Closed).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RuleSet, ClientRule};
    use std::collections::HashMap;

    #[tokio::test]
    async fn open_emits_session_event_first() {
        let layer = SseSessionLayer::new(SseConfig::default());
        let (session_id, mut rx, _inbound) = layer.open("http://localhost/sse/messages").await.unwrap();
        match rx.recv().await.unwrap() {
            SseEvent::Opened { session_id: opened_id, .. } => assert_eq!(opened_id, session_id),
            other => panic!("expected Opened event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_message_to_unknown_session_errors() {
        let layer = SseSessionLayer::new(SseConfig::default());
        let req = JsonRpcRequest { jsonrpc: "2.0".to_string(), method: "x".to_string(), params: None, id: None };
        let err = layer.post_message("ghost", "server".to_string(), req).await.unwrap_err();
        assert!(matches!(err, SessionError::Unknown(_)));
    }

    #[tokio::test]
    async fn open_past_capacity_is_rejected() {
        let layer = SseSessionLayer::new(SseConfig { max_sessions: 1, idle_timeout: Duration::from_secs(300) });
        let _first = layer.open("http://localhost/sse/messages").await.unwrap();
        let second = layer.open("http://localhost/sse/messages").await;
        assert!(matches!(second, Err(SessionError::AtCapacity(1))));
    }

    fn empty_registry() -> Arc<UpstreamRegistry> {
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
        Arc::new(UpstreamRegistry::from_config(&config))
    }

    #[tokio::test]
    async fn run_session_routes_post_message_to_response_event() {
        let layer = Arc::new(SseSessionLayer::new(SseConfig::default()));
        let (session_id, mut outbound_rx, inbound_rx) =
            layer.open("http://localhost/sse/messages").await.unwrap();
        assert!(matches!(outbound_rx.recv().await.unwrap(), SseEvent::Opened { .. }));

        let worker = {
            let layer = layer.clone();
            let registry = empty_registry();
            let session_id = session_id.clone();
            tokio::spawn(async move { layer.run_session(session_id, registry, inbound_rx).await })
        };

        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: None,
            id: Some(serde_json::json!(1)),
        };
        layer.post_message(&session_id, "ghost".to_string(), req).await.unwrap();

        match outbound_rx.recv().await.unwrap() {
            SseEvent::Response(value) => {
                assert_eq!(value["error"]["code"], serde_json::json!(-32601));
            }
            other => panic!("expected Response event, got {other:?}"),
        }

        layer.shutdown().await;
        let _ = worker.await;
    }
}
