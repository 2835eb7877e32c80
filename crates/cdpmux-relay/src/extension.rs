//! Extension endpoint: the single privileged upstream.
//!
//! At most one extension socket is current. A newly accepted connection
//! supersedes the previous one; losing the current connection fails every
//! in-flight request and closes every client session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};

use cdpmux_protocol::{
    close, error_frame, event_frame, methods, result_frame, CdpEvent, ExtensionFrame,
    ExtensionResponse,
};

use crate::state::{ExtensionHandle, RelayState};
use crate::writer::{run_writer, socket_channel};

/// `GET /extension`: upgrade for the privileged extension peer.
///
/// Admission is origin-based: the request must carry an `Origin` equal to
/// one of the configured extension origins. Browsers always send Origin on
/// WebSocket upgrades, so a missing header is an immediate reject.
pub(crate) async fn extension_ws_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("Extension upgrade without Origin header rejected");
        return (StatusCode::FORBIDDEN, "Origin header required").into_response();
    };

    if !state
        .config
        .extension_allowed_origins
        .iter()
        .any(|allowed| allowed == origin)
    {
        warn!(%origin, "Extension upgrade from disallowed origin rejected");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    ws.on_upgrade(move |socket| handle_extension_socket(socket, state))
}

async fn handle_extension_socket(socket: WebSocket, state: Arc<RelayState>) {
    let epoch = state.next_epoch();
    let (sink, stream) = socket.split();
    let (sender, halves) = socket_channel(state.config.write_queue_capacity);

    let superseded = state
        .install_extension(ExtensionHandle { epoch, sender })
        .await;
    if let Some(old) = superseded {
        info!(old_epoch = old.epoch, epoch, "Extension superseded");
        old.close(close::SUPERSEDED, close::SUPERSEDED_REASON);
        state.fail_pending_for_epoch(old.epoch);
        state
            .clients
            .close_all(close::EXTENSION_GONE, close::EXTENSION_GONE_REASON);
        state.targets.clear();
    }
    info!(epoch, "Extension connected");

    // Advertise currently known targets to clients (empty on a fresh
    // connect).
    for entry in state.targets.snapshot() {
        state.clients.broadcast(&event_frame(
            methods::TARGET_CREATED,
            json!({ "targetInfo": entry.info }),
            None,
        ));
    }

    let mut send_task = tokio::spawn(run_writer(sink, halves));
    let reader_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        read_loop(stream, reader_state).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if state.clear_extension_if_epoch(epoch).await {
        info!(epoch, "Extension disconnected");
        state.fail_pending_for_epoch(epoch);
        state
            .clients
            .close_all(close::EXTENSION_GONE, close::EXTENSION_GONE_REASON);
        state.targets.clear();
    } else {
        // Superseded: the accept path already tore everything down.
        debug!(epoch, "Superseded extension socket closed");
        state.fail_pending_for_epoch(epoch);
    }
}

/// Single reader task: extension frames are demultiplexed in receive
/// order, so events a session saw before a response always reach the
/// client before that response.
async fn read_loop(mut stream: SplitStream<WebSocket>, state: Arc<RelayState>) {
    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => match serde_json::from_str::<ExtensionFrame>(&text) {
                Ok(ExtensionFrame::Response(response)) => deliver_response(&state, response),
                Ok(ExtensionFrame::Event(event)) => route_event(&state, event),
                Err(error) => {
                    warn!(%error, "Dropping malformed extension frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "Extension socket error");
                break;
            }
        }
    }
}

/// Hand a response to the correlator: take the pending entry, substitute
/// the client's original id, and write to the originating client only.
fn deliver_response(state: &RelayState, response: ExtensionResponse) {
    let Some(request) = state.pending.take(response.id) else {
        debug!(relay_id = response.id, "Discarding late or unknown extension response");
        return;
    };
    let Some(client_id) = request.client_id else {
        debug!(method = %request.method, "Internal request completed");
        return;
    };
    let Some(client) = state.clients.get(&client_id) else {
        debug!(relay_id = response.id, %client_id, method = %request.method,
            "Dropping response for disconnected client");
        return;
    };

    let frame = match response.error {
        Some(error) => error_frame(&request.client_request_id, error),
        None => result_frame(
            &request.client_request_id,
            response.result.unwrap_or_else(|| json!({})),
        ),
    };
    client.send(&frame);
}

/// Update the target table, then fan the event out: browser-scoped events
/// broadcast, session-scoped events reach only attached clients.
fn route_event(state: &RelayState, event: CdpEvent) {
    state.targets.observe(&event);

    let frame = event_frame(
        &event.method,
        event.params.unwrap_or_else(|| json!({})),
        event.session_id.as_deref(),
    );
    match event.session_id.as_deref() {
        None => state.clients.broadcast(&frame),
        Some(session_id) => state.clients.route_session(session_id, &frame),
    }
}
