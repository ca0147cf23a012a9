//! HTTP/WebSocket transport.
//!
//! Hosts three routes:
//! - `GET /health` — liveness probe, unauthenticated
//! - `GET /load`   — one-shot JSON of the latest CPU load, token-gated
//! - `GET /ws`     — WebSocket upgrade for telemetry subscribers
//!
//! The subscriber token travels as connection-establishment metadata: the
//! `x-cluster-token` header, or a `token` query parameter for browser
//! WebSocket clients that cannot set headers. Admission is decided before
//! the upgrade completes; a rejected attempt gets a 401 and never sees a
//! single telemetry frame.

use crate::identity::HostIdentity;
use crate::metrics::{ClusterSnapshot, CpuLoad};
use crate::registry::{envelope, Registry};
use crate::state::Shared;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub identity: Arc<HostIdentity>,
    pub latest: Shared<Option<ClusterSnapshot>>,
    pub shutdown: watch::Receiver<bool>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/load", get(get_load))
        .route("/ws", get(ws_upgrade))
        .with_state(app_state)
}

/// Pull the presented credential out of the handshake metadata.
fn presented_token(headers: &HeaderMap, params: &HashMap<String, String>) -> Option<String> {
    headers
        .get("x-cluster-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| params.get("token").cloned())
}

// GET /load (latest sampled CPU load, one-shot)
async fn get_load(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<CpuLoad>, StatusCode> {
    let presented = presented_token(&headers, &params).unwrap_or_default();
    if !app.registry.authenticate(&presented) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    match app.latest.lock().as_ref() {
        Some(snapshot) => Ok(Json(snapshot.cpu.clone())),
        None => Err(StatusCode::SERVICE_UNAVAILABLE), // no tick yet
    }
}

// GET /ws (subscriber handshake + upgrade)
async fn ws_upgrade(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let presented = presented_token(&headers, &params).unwrap_or_default();
    if !app.registry.authenticate(&presented) {
        info!("subscriber rejected: invalid token");
        return (StatusCode::UNAUTHORIZED, "auth-error: invalid token").into_response();
    }
    ws.on_upgrade(move |socket| handle_subscriber(socket, app))
}

/// Drive one admitted subscriber until it disconnects or the service stops.
async fn handle_subscriber(socket: WebSocket, app: AppState) {
    let id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();

    // One-time identity payload, delivered before joining the group so it
    // always precedes the first telemetry frame on this connection.
    let hello = match envelope("host-identity", &*app.identity) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%id, "failed to serialize host identity: {e}");
            return;
        }
    };
    if sink.send(Message::Text(hello.into())).await.is_err() {
        debug!(%id, "subscriber vanished during handshake");
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    app.registry.admit(id, tx);
    info!(%id, subscribers = app.registry.member_count(), "subscriber admitted");

    let mut shutdown = app.shutdown.clone();
    loop {
        tokio::select! {
            queued = rx.recv() => match queued {
                Some(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // inbound frames carry no meaning here
            },
            _ = shutdown.changed() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    warn!(%id, "close frame failed during shutdown: {e}");
                }
                break;
            }
        }
    }

    app.registry.remove(id);
    info!(%id, subscribers = app.registry.member_count(), "subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-cluster-token", HeaderValue::from_static("from-header"));
        let mut params = HashMap::new();
        params.insert("token".to_string(), "from-query".to_string());

        assert_eq!(
            presented_token(&headers, &params).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn token_falls_back_to_query_param() {
        let headers = HeaderMap::new();
        let mut params = HashMap::new();
        params.insert("token".to_string(), "from-query".to_string());

        assert_eq!(
            presented_token(&headers, &params).as_deref(),
            Some("from-query")
        );
    }

    #[test]
    fn missing_token_is_none() {
        assert_eq!(presented_token(&HeaderMap::new(), &HashMap::new()), None);
    }
}
