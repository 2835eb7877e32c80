//! Relay server: router assembly, bind, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use cdpmux_protocol::close;

use crate::client_ws::{cdp_ws_handler, cdp_ws_handler_with_id};
use crate::error::RelayError;
use crate::extension::extension_ws_handler;
use crate::http;
use crate::state::{RelayConfig, RelayState};

/// The relay server: one HTTP listener carrying both WebSocket endpoints
/// and the status routes.
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bind the listening socket. Port 0 picks an ephemeral port; use
    /// [`local_addr`](Self::local_addr) to discover it.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let state = RelayState::new(config);
        Ok(Self { state, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state handle, usable to trigger shutdown or inspect status.
    pub fn state(&self) -> Arc<RelayState> {
        self.state.clone()
    }

    /// Serve until the shutdown notify fires, then drain: every pending
    /// request gets its terminal error and every socket is closed.
    pub async fn serve(self) -> Result<(), RelayError> {
        let state = self.state;
        let app = router(state.clone());

        info!("Relay listening on {}", self.listener.local_addr()?);

        // The drain runs inside the shutdown future: open WebSocket
        // connections only finish once their sockets are closed, and the
        // serve call waits for every connection before returning.
        let shutdown_state = state.clone();
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_state.shutdown.notified().await;
            drain(&shutdown_state).await;
        })
        .await?;

        Ok(())
    }
}

fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/extension", get(extension_ws_handler))
        .route("/cdp", get(cdp_ws_handler))
        .route("/cdp/{client_id}", get(cdp_ws_handler_with_id))
        .route("/version", get(http::version))
        .route("/extension/status", get(http::extension_status))
        .route("/mcp-log", post(http::mcp_log))
        .with_state(state)
}

async fn drain(state: &RelayState) {
    state.fail_all_pending();
    state
        .clients
        .close_all(close::GOING_AWAY, close::GOING_AWAY_REASON);
    if let Some(extension) = state.take_extension().await {
        extension.close(close::GOING_AWAY, close::GOING_AWAY_REASON);
    }
    state.targets.clear();
    info!("Relay drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = RelayConfig {
            port: 0,
            ..RelayConfig::default()
        };
        let server = RelayServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let config = RelayConfig {
            port: 0,
            ..RelayConfig::default()
        };
        let first = RelayServer::bind(config.clone()).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let conflict = RelayConfig {
            port,
            ..RelayConfig::default()
        };
        let result = RelayServer::bind(conflict).await;
        assert!(matches!(result, Err(RelayError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_notify_stops_serve() {
        let config = RelayConfig {
            port: 0,
            ..RelayConfig::default()
        };
        let server = RelayServer::bind(config).await.unwrap();
        let state = server.state();

        let task = tokio::spawn(server.serve());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        state.shutdown.notify_one();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("serve should stop after shutdown")
            .expect("serve task should not panic");
        assert!(result.is_ok());
    }
}
