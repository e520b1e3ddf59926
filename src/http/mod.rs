//! HTTP surface glue (ambient component #13): an `axum` router wiring the
//! dispatcher's routes, extracting `X-Client-Name`/`X-Session-ID`, and
//! translating [`GatewayError`] into HTTP status + JSON-RPC error bodies.
//!
//! Grounded on the `ServerState` + `Router::with_state` + `ServiceBuilder`
//! layering pattern this kind of gateway uses for its axum surface.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = ServerState { dispatcher };

    Router::new()
        .route("/enhance", post(handlers::enhance))
        .route("/health", get(handlers::health))
        .route("/health/:server", get(handlers::health_for_server))
        .route("/sse", get(handlers::sse_open))
        .route("/sse/messages", post(handlers::sse_post_message))
        .route("/:server/*path", post(handlers::call_upstream))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
}
