//! Plain HTTP surface: version, extension status, client log sink.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::state::RelayState;

/// `GET /version`
pub(crate) async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// `GET /extension/status`
pub(crate) async fn extension_status(State(state): State<Arc<RelayState>>) -> Json<Value> {
    Json(json!({
        "connected": state.extension_connected().await,
        "targets": state.targets.snapshot(),
        "clients": state.clients.count(),
    }))
}

/// `POST /mcp-log`: append-only log sink for clients. Fire-and-forget:
/// malformed bodies are swallowed and the response is always 204.
pub(crate) async fn mcp_log(body: Bytes) -> StatusCode {
    if let Ok(entry) = serde_json::from_slice::<Value>(&body) {
        let level = entry
            .get("level")
            .and_then(|value| value.as_str())
            .unwrap_or("info");
        let args = entry.get("args").cloned().unwrap_or_else(|| json!([]));
        match level {
            "error" => error!(source = "mcp-log", %args, "client log"),
            "warn" => warn!(source = "mcp-log", %args, "client log"),
            "debug" => debug!(source = "mcp-log", %args, "client log"),
            _ => info!(source = "mcp-log", %args, "client log"),
        }
    }
    StatusCode::NO_CONTENT
}
