//! CDP client endpoint: admission, per-session loops, command dispatch.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cdpmux_protocol::{close, error_frame, CdpCommand, CdpErrorBody};

use crate::clients::ClientHandle;
use crate::intercept;
use crate::state::RelayState;
use crate::writer::{run_writer, socket_channel, SendError};

/// `GET /cdp`: upgrade with a generated client id.
pub(crate) async fn cdp_ws_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    accept_client(state, headers, params, peer, ws, None)
}

/// `GET /cdp/{client_id}`: upgrade with a caller-supplied client id.
pub(crate) async fn cdp_ws_handler_with_id(
    State(state): State<Arc<RelayState>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    accept_client(state, headers, params, peer, ws, Some(client_id))
}

fn accept_client(
    state: Arc<RelayState>,
    headers: HeaderMap,
    params: HashMap<String, String>,
    peer: SocketAddr,
    ws: WebSocketUpgrade,
    client_id: Option<String>,
) -> Response {
    if let Err(rejection) = admit(&state, &headers, &params, peer) {
        return rejection;
    }

    let client_id = client_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if state.clients.contains(&client_id) {
        return (StatusCode::CONFLICT, "client id already in use").into_response();
    }

    ws.on_upgrade(move |socket| handle_client_socket(socket, state, client_id))
}

/// Admission policy: with a configured token the client must present it;
/// without one, only loopback peers and non-browser callers (no `Origin`
/// header) are admitted.
fn admit(
    state: &RelayState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
    peer: SocketAddr,
) -> Result<(), Response> {
    match &state.config.bearer_token {
        Some(token) => {
            let header_ok = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|presented| constant_time_eq(presented, token))
                .unwrap_or(false);
            let query_ok = params
                .get("token")
                .map(|presented| constant_time_eq(presented, token))
                .unwrap_or(false);

            if header_ok || query_ok {
                Ok(())
            } else {
                warn!(%peer, "CDP upgrade without valid bearer token rejected");
                Err((StatusCode::UNAUTHORIZED, "Missing or invalid bearer token").into_response())
            }
        }
        None => {
            if peer.ip().is_loopback() || !headers.contains_key(header::ORIGIN) {
                Ok(())
            } else {
                warn!(%peer, "Non-loopback browser CDP upgrade rejected");
                Err((StatusCode::FORBIDDEN, "Loopback peers only").into_response())
            }
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

async fn handle_client_socket(socket: WebSocket, state: Arc<RelayState>, client_id: String) {
    let (sink, stream) = socket.split();
    let (sender, halves) = socket_channel(state.config.write_queue_capacity);
    let client = ClientHandle::new(client_id.clone(), sender);

    if !state.clients.insert(client.clone()) {
        // Lost a connect race for the same id; drop this socket.
        warn!(%client_id, "Duplicate client id at upgrade time");
        return;
    }
    info!(%client_id, "CDP client connected");

    let mut send_task = tokio::spawn(run_writer(sink, halves));
    let reader_state = state.clone();
    let reader_client = client.clone();
    let mut recv_task = tokio::spawn(async move {
        read_loop(stream, reader_state, reader_client).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Already-forwarded requests stay dispatched; their responses are
    // dropped when they arrive. The extension is never told.
    state.clients.remove(&client_id);
    let abandoned = state.pending.take_client(&client_id);
    if !abandoned.is_empty() {
        debug!(%client_id, count = abandoned.len(), "Dropped pending requests of disconnected client");
    }
    info!(%client_id, "CDP client disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    state: Arc<RelayState>,
    client: Arc<ClientHandle>,
) {
    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => {
                let command = match serde_json::from_str::<CdpCommand>(&text) {
                    Ok(command) => command,
                    Err(error) => {
                        warn!(client_id = %client.client_id, %error, "Dropping malformed client frame");
                        continue;
                    }
                };
                dispatch(&state, &client, command).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(client_id = %client.client_id, %error, "Client socket error");
                break;
            }
        }
    }
}

async fn dispatch(state: &Arc<RelayState>, client: &Arc<ClientHandle>, command: CdpCommand) {
    if intercept::handle(state, client, &command) {
        return;
    }
    forward(state, client, command).await;
}

/// Forward a command to the extension under a fresh relay id.
async fn forward(state: &Arc<RelayState>, client: &Arc<ClientHandle>, command: CdpCommand) {
    let Some(extension) = state.extension_handle().await else {
        client.send(&error_frame(
            &command.id,
            CdpErrorBody::message("Extension not connected"),
        ));
        return;
    };

    let relay_id = state.next_relay_id();
    state.pending.insert(
        relay_id,
        crate::pending::PendingRequest {
            client_id: Some(client.client_id.clone()),
            client_request_id: command.id,
            method: command.method.clone(),
            epoch: extension.epoch,
        },
    );

    let mut frame = json!({ "id": relay_id, "method": command.method });
    if let Some(params) = command.params {
        frame["params"] = params;
    }
    if let Some(session_id) = command.session_id {
        frame["sessionId"] = json!(session_id);
    }

    match extension.send(frame.to_string()) {
        Ok(()) => spawn_timeout(state.clone(), relay_id),
        Err(SendError::Full) => {
            // The extension is not draining its queue; drop it per the
            // back-pressure policy rather than blocking every client.
            warn!("Extension write queue full, closing as slow consumer");
            extension.close(close::SLOW_CONSUMER, close::SLOW_CONSUMER_REASON);
            fail_now(state, relay_id);
        }
        Err(SendError::Closed) => fail_now(state, relay_id),
    }
}

fn fail_now(state: &RelayState, relay_id: u64) {
    if let Some(request) = state.pending.take(relay_id) {
        if let Some(client_id) = request.client_id {
            if let Some(client) = state.clients.get(&client_id) {
                client.send(&error_frame(
                    &request.client_request_id,
                    CdpErrorBody::message("Extension not connected"),
                ));
            }
        }
    }
}

/// Arm the per-request deadline. Firing after the entry was taken is a
/// no-op; whoever takes the entry owns the terminal signal.
fn spawn_timeout(state: Arc<RelayState>, relay_id: u64) {
    let timeout = state.config.request_timeout;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(request) = state.pending.take(relay_id) else {
            return;
        };
        debug!(relay_id, method = %request.method, "Forwarded request timed out");
        let Some(client_id) = request.client_id else {
            return;
        };
        if let Some(client) = state.clients.get(&client_id) {
            client.send(&error_frame(
                &request.client_request_id,
                CdpErrorBody::message(format!(
                    "Extension request timeout after {}ms: {}",
                    timeout.as_millis(),
                    request.method
                )),
            ));
        }
    });
}
