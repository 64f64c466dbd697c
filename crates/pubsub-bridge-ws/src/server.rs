//! HTTP server and routing.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use pubsub_bridge_core::{ConnectionRegistry, PublishBridge, SubscriptionState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::origin::OriginPolicy;
use crate::session::{ConnectionSession, SessionConfig};

/// State shared by every handler.
pub struct BridgeState {
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: PublishBridge,
    pub origins: OriginPolicy,
    pub session: SessionConfig,
    /// Cancelled when the process shuts down; sessions derive their tokens
    /// from it.
    pub shutdown: CancellationToken,
    pub subscription: watch::Receiver<SubscriptionState>,
}

impl BridgeState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        publisher: PublishBridge,
        origins: OriginPolicy,
        session: SessionConfig,
        shutdown: CancellationToken,
        subscription: watch::Receiver<SubscriptionState>,
    ) -> Self {
        Self {
            registry,
            publisher,
            origins,
            session,
            shutdown,
            subscription,
        }
    }
}

/// Create the Axum router.
pub fn create_router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve until the shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: Arc<BridgeState>) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "WebSocket endpoint listening on ws://{}/ws", addr);
    }
    let shutdown = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<Arc<BridgeState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        warn!(origin = origin.unwrap_or("<none>"), "Rejected WebSocket from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(error = %rejection, "Error upgrading to websockets");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(|error| warn!(error = %error, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run a session over an accepted WebSocket.
async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>) {
    let (sink, stream) = socket.split();
    let session = ConnectionSession::new(
        state.registry.clone(),
        state.publisher.clone(),
        state.session.clone(),
        state.shutdown.clone(),
    );
    session.run(stream, sink).await;
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    let subscription = *state.subscription.borrow();
    let status = if subscription == SubscriptionState::Subscribed {
        "ok"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": status,
            "connections": state.registry.len(),
            "connections_total": state.registry.total_registered(),
            "subscription": subscription.to_string(),
        })
        .to_string(),
    )
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
