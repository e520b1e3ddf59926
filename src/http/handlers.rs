use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::ServerState;
use crate::sse::SseEvent;
use crate::transport::JsonRpcRequest;

const CLIENT_NAME_HEADER: &str = "x-client-name";
const SESSION_ID_HEADER: &str = "x-session-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn call_upstream(
    State(state): State<ServerState>,
    Path((server, path)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let req: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            let err = crate::error::GatewayError::Parse(e.to_string());
            return (StatusCode::from_u16(err.http_status()).unwrap(), Json(err.to_json_rpc_error()));
        }
    };

    match state.dispatcher.call_upstream(&server, &path, req).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::to_value(response).unwrap_or_default())),
        Err(err) => (StatusCode::from_u16(err.http_status()).unwrap(), Json(err.to_json_rpc_error())),
    }
}

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    pub prompt: String,
    #[serde(default)]
    pub client: Option<String>,
}

pub async fn enhance(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<EnhanceRequest>,
) -> impl IntoResponse {
    let client_name = body.client.as_deref().or_else(|| header_str(&headers, CLIENT_NAME_HEADER));
    let result = state.dispatcher.enhance(&body.prompt, client_name).await;
    Json(serde_json::json!({
        "original": result.original,
        "enhanced": result.enhanced,
        "model": result.model,
        "cached": result.cached,
    }))
}

pub async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.dispatcher.health())
}

pub async fn health_for_server(State(state): State<ServerState>, Path(server): Path<String>) -> impl IntoResponse {
    match state.dispatcher.health_for(&server) {
        Some(snapshot) => (StatusCode::OK, Json(serde_json::to_value(snapshot).unwrap_or_default())).into_response(),
        None => {
            let err = crate::error::GatewayError::UnknownServer(server);
            (StatusCode::from_u16(err.http_status()).unwrap(), Json(err.to_json_rpc_error())).into_response()
        }
    }
}

pub async fn sse_open(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = match state.dispatcher.sse.open("/sse/messages").await {
        Ok((session_id, outbound_rx, inbound_rx)) => {
            let sse = state.dispatcher.sse.clone();
            let registry = state.dispatcher.registry.clone();
            tokio::spawn(async move { sse.run_session(session_id, registry, inbound_rx).await });
            outbound_rx
        }
        Err(_) => {
            // Session cap hit: emit a single immediate close event.
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.try_send(SseEvent::Closed);
            rx
        }
    };

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session: String,
    /// Target upstream name. A JSON-RPC `method` (e.g. `"tools/call"`) is a
    /// namespace/verb pair, never an upstream name, so the caller must say
    /// which upstream this message routes to (see SPEC_FULL.md §9).
    pub server: String,
}

pub async fn sse_post_message(
    State(state): State<ServerState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let session_id = header_str(&headers, SESSION_ID_HEADER).unwrap_or(&query.session);

    let req: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            let err = crate::error::GatewayError::Parse(e.to_string());
            return (StatusCode::from_u16(err.http_status()).unwrap(), Json(err.to_json_rpc_error()));
        }
    };

    match state.dispatcher.sse.post_message(session_id, query.server.clone(), req).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "accepted" }))),
        Err(_) => {
            let err = crate::error::GatewayError::UnknownSession(session_id.to_string());
            (StatusCode::from_u16(err.http_status()).unwrap(), Json(err.to_json_rpc_error()))
        }
    }
}
