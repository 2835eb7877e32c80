//! Shared relay state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use cdpmux_protocol::{error_frame, CdpErrorBody};

use crate::clients::ClientRegistry;
use crate::pending::{PendingRequest, PendingTable};
use crate::targets::TargetTable;
use crate::writer::{SendError, SocketSender};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Token CDP clients must present. Unset means loopback-only admission.
    pub bearer_token: Option<String>,
    /// Origins accepted on the extension endpoint.
    pub extension_allowed_origins: Vec<String>,
    /// Deadline for a forwarded command.
    pub request_timeout: Duration,
    /// Capacity of each per-socket write queue.
    pub write_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9223,
            bearer_token: None,
            extension_allowed_origins: Vec::new(),
            request_timeout: Duration::from_millis(30_000),
            write_queue_capacity: 256,
        }
    }
}

/// The current extension connection.
#[derive(Clone)]
pub struct ExtensionHandle {
    /// Monotonic connect-epoch; pending requests carry the epoch they were
    /// dispatched under so a superseded socket only fails its own.
    pub epoch: u64,
    pub(crate) sender: SocketSender,
}

impl ExtensionHandle {
    pub(crate) fn send(&self, frame: String) -> Result<(), SendError> {
        self.sender.send(frame)
    }

    pub(crate) fn close(&self, code: u16, reason: &'static str) {
        self.sender.close(code, reason);
    }
}

/// Process-wide relay state shared across all handlers.
pub struct RelayState {
    pub config: RelayConfig,
    pub clients: ClientRegistry,
    pub targets: TargetTable,
    pub pending: PendingTable,
    /// Notified to begin graceful shutdown.
    pub shutdown: Notify,
    extension: Mutex<Option<ExtensionHandle>>,
    epochs: AtomicU64,
    relay_ids: AtomicU64,
    started_at: Instant,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            clients: ClientRegistry::new(),
            targets: TargetTable::new(),
            pending: PendingTable::new(),
            shutdown: Notify::new(),
            extension: Mutex::new(None),
            epochs: AtomicU64::new(0),
            relay_ids: AtomicU64::new(1),
            started_at: Instant::now(),
        })
    }

    pub fn next_relay_id(&self) -> u64 {
        self.relay_ids.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Swap in a new extension connection, returning the superseded one.
    pub(crate) async fn install_extension(&self, handle: ExtensionHandle) -> Option<ExtensionHandle> {
        self.extension.lock().await.replace(handle)
    }

    /// Clear the slot if it still holds the given epoch. Returns true when
    /// this call emptied the slot; a superseded socket finds a newer epoch
    /// and leaves it alone.
    pub(crate) async fn clear_extension_if_epoch(&self, epoch: u64) -> bool {
        let mut slot = self.extension.lock().await;
        if slot.as_ref().map(|ext| ext.epoch) == Some(epoch) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Take the current extension handle out of the slot (relay drain).
    pub(crate) async fn take_extension(&self) -> Option<ExtensionHandle> {
        self.extension.lock().await.take()
    }

    pub async fn extension_handle(&self) -> Option<ExtensionHandle> {
        self.extension.lock().await.clone()
    }

    pub async fn extension_connected(&self) -> bool {
        self.extension.lock().await.is_some()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fail every pending request dispatched under `epoch` with an
    /// upstream-gone error delivered to its originating client.
    pub(crate) fn fail_pending_for_epoch(&self, epoch: u64) {
        self.deliver_failures(self.pending.take_epoch(epoch));
    }

    /// Fail everything still pending (relay drain).
    pub(crate) fn fail_all_pending(&self) {
        self.deliver_failures(self.pending.take_all());
    }

    fn deliver_failures(&self, requests: Vec<PendingRequest>) {
        for request in requests {
            let Some(client_id) = request.client_id else {
                debug!(method = %request.method, "Internal request failed: extension gone");
                continue;
            };
            if let Some(client) = self.clients.get(&client_id) {
                client.send(&error_frame(
                    &request.client_request_id,
                    CdpErrorBody::message("Extension not connected"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::socket_channel;
    use serde_json::json;

    fn handle_with_epoch(state: &RelayState) -> (ExtensionHandle, crate::writer::WriterHalves) {
        let (sender, halves) = socket_channel(8);
        (
            ExtensionHandle {
                epoch: state.next_epoch(),
                sender,
            },
            halves,
        )
    }

    #[test]
    fn test_relay_ids_are_monotonic() {
        let state = RelayState::new(RelayConfig::default());
        let first = state.next_relay_id();
        let second = state.next_relay_id();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_install_returns_superseded_handle() {
        let state = RelayState::new(RelayConfig::default());
        let (first, _h1) = handle_with_epoch(&state);
        let (second, _h2) = handle_with_epoch(&state);
        let first_epoch = first.epoch;

        assert!(state.install_extension(first).await.is_none());
        let old = state.install_extension(second).await.unwrap();
        assert_eq!(old.epoch, first_epoch);
        assert!(state.extension_connected().await);
    }

    #[tokio::test]
    async fn test_clear_only_matches_own_epoch() {
        let state = RelayState::new(RelayConfig::default());
        let (first, _h1) = handle_with_epoch(&state);
        let (second, _h2) = handle_with_epoch(&state);
        let first_epoch = first.epoch;
        let second_epoch = second.epoch;

        state.install_extension(first).await;
        state.install_extension(second).await;

        // The superseded socket must not evict its replacement.
        assert!(!state.clear_extension_if_epoch(first_epoch).await);
        assert!(state.extension_connected().await);

        assert!(state.clear_extension_if_epoch(second_epoch).await);
        assert!(!state.extension_connected().await);
    }

    #[tokio::test]
    async fn test_epoch_failure_delivers_error_to_client() {
        let state = RelayState::new(RelayConfig::default());
        let (sender, mut halves) = socket_channel(8);
        let client = crate::clients::ClientHandle::new("c1".to_string(), sender);
        state.clients.insert(client);

        state.pending.insert(
            1,
            crate::pending::PendingRequest {
                client_id: Some("c1".to_string()),
                client_request_id: json!(4),
                method: "Page.enable".to_string(),
                epoch: 1,
            },
        );

        state.fail_pending_for_epoch(1);

        let frame = halves.recv_frame().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["error"]["message"], "Extension not connected");
        assert!(state.pending.is_empty());
    }
}
