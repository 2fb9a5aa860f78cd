//! HTTP and WebSocket surface.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use whiteboard_core::{ProtocolError, ServerMessage, SyncProtocol};

use crate::config::AllowedOrigin;
use crate::sync::{SyncError, SyncServer};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    participants: usize,
    pages: usize,
}

/// Shared router state
#[derive(Clone)]
struct AppState {
    server: Arc<SyncServer>,
    origin: AllowedOrigin,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.server.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: stats.uptime_seconds,
        participants: stats.participants,
        pages: stats.pages,
    })
}

async fn index() -> &'static str {
    "Whiteboard sync server is running"
}

/// WebSocket upgrade handler.
///
/// A handshake carrying an `Origin` other than the allowed one is refused.
/// Handshakes without the header (non-browser clients) are accepted.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let AllowedOrigin::Exact(allowed) = &state.origin {
        if let Some(origin) = headers.get(header::ORIGIN) {
            if origin != allowed {
                warn!("Refusing WebSocket from origin {:?}", origin);
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }

    let server = state.server;
    ws.on_upgrade(move |socket| handle_websocket(socket, server))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, server: Arc<SyncServer>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this participant
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = server.connect(tx);

    let conn_id_send = conn_id.clone();
    let conn_id_recv = conn_id.clone();
    let server_recv = server.clone();

    // Task to forward messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match SyncProtocol::encode_server(&msg) {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to encode message: {}", e);
                }
            }
        }
        debug!("Send task ended for {}", conn_id_send);
    });

    // Task to handle incoming WebSocket messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = server_recv.handle_frame(&conn_id_recv, &text) {
                        warn!("Rejected message from {}: {}", conn_id_recv, e);
                    }
                }
                Message::Binary(_) => {
                    let e = SyncError::from(ProtocolError::UnsupportedFrame);
                    warn!("Rejected message from {}: {}", conn_id_recv, e);
                }
                Message::Close(_) => {
                    debug!("WebSocket closed by client: {}", conn_id_recv);
                    break;
                }
                // Pong is handled automatically
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        debug!("Receive task ended for {}", conn_id_recv);
    });

    // Whichever side finishes first tears the connection down
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    server.disconnect(&conn_id);
}

fn cors_layer(origin: &AllowedOrigin) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origin {
        AllowedOrigin::Any => cors.allow_origin(Any),
        AllowedOrigin::Exact(value) => cors.allow_origin(value.clone()),
    }
}

/// Build the application router
pub fn router(server: Arc<SyncServer>, origin: &AllowedOrigin) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .with_state(AppState {
            server,
            origin: origin.clone(),
        })
        .layer(cors_layer(origin))
        .layer(TraceLayer::new_for_http())
}

/// Serve the router on an already bound listener until the process stops
pub async fn serve(
    listener: TcpListener,
    server: Arc<SyncServer>,
    origin: &AllowedOrigin,
) -> std::io::Result<()> {
    let app = router(server, origin);
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, app).await
}
