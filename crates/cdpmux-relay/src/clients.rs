//! Client session registry and event routing.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use cdpmux_protocol::close;

use crate::writer::{SendError, SocketSender};

/// One connected CDP client session.
pub struct ClientHandle {
    pub client_id: String,
    sender: SocketSender,
    /// Session ids this client attached to via `Target.attachToTarget`.
    sessions: Mutex<HashSet<String>>,
}

impl ClientHandle {
    pub(crate) fn new(client_id: String, sender: SocketSender) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            sender,
            sessions: Mutex::new(HashSet::new()),
        })
    }

    /// Enqueue a frame for this client. A full queue closes the socket
    /// with `SLOW_CONSUMER` instead of blocking the broker.
    pub fn send(&self, frame: &Value) -> bool {
        match self.sender.send(frame.to_string()) {
            Ok(()) => true,
            Err(SendError::Full) => {
                warn!(client_id = %self.client_id, "Client write queue full, closing as slow consumer");
                self.sender
                    .close(close::SLOW_CONSUMER, close::SLOW_CONSUMER_REASON);
                false
            }
            Err(SendError::Closed) => false,
        }
    }

    pub fn close(&self, code: u16, reason: &'static str) {
        self.sender.close(code, reason);
    }

    pub fn attach_session(&self, session_id: &str) {
        self.sessions.lock().insert(session_id.to_string());
    }

    pub fn is_attached(&self, session_id: &str) -> bool {
        self.sessions.lock().contains(session_id)
    }
}

/// Registry of live client sessions keyed by client id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Returns false if the id is already taken.
    pub(crate) fn insert(&self, handle: Arc<ClientHandle>) -> bool {
        match self.clients.entry(handle.client_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn remove(&self, client_id: &str) {
        self.clients.remove(client_id);
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientHandle>> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Deliver a browser-scoped event to every client.
    pub fn broadcast(&self, frame: &Value) {
        for entry in self.clients.iter() {
            entry.value().send(frame);
        }
    }

    /// Deliver a session-scoped event to the clients attached to it.
    pub fn route_session(&self, session_id: &str, frame: &Value) {
        for entry in self.clients.iter() {
            if entry.value().is_attached(session_id) {
                entry.value().send(frame);
            }
        }
    }

    /// Close every client session with the given code.
    pub fn close_all(&self, code: u16, reason: &'static str) {
        for entry in self.clients.iter() {
            entry.value().close(code, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::socket_channel;
    use serde_json::json;

    fn test_handle(id: &str, capacity: usize) -> (Arc<ClientHandle>, crate::writer::WriterHalves) {
        let (sender, halves) = socket_channel(capacity);
        (ClientHandle::new(id.to_string(), sender), halves)
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = ClientRegistry::new();
        let (handle, _halves) = test_handle("c1", 4);

        assert!(registry.insert(handle));
        assert!(registry.contains("c1"));
        assert_eq!(registry.count(), 1);

        registry.remove("c1");
        assert!(!registry.contains("c1"));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ClientRegistry::new();
        let (first, _h1) = test_handle("c1", 4);
        let (second, _h2) = test_handle("c1", 4);

        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let (c1, mut h1) = test_handle("c1", 4);
        let (c2, mut h2) = test_handle("c2", 4);
        registry.insert(c1);
        registry.insert(c2);

        registry.broadcast(&json!({"method": "Target.targetCreated", "params": {}}));

        for halves in [&mut h1, &mut h2] {
            let frame = halves.recv_frame().await.unwrap();
            assert!(frame.contains("Target.targetCreated"));
        }
    }

    #[tokio::test]
    async fn test_session_routing_only_reaches_attached() {
        let registry = ClientRegistry::new();
        let (c1, mut h1) = test_handle("c1", 4);
        let (c2, mut h2) = test_handle("c2", 4);
        c1.attach_session("S1");
        registry.insert(c1);
        registry.insert(c2);

        registry.route_session("S1", &json!({"method": "Page.loadEventFired"}));

        assert!(h1.recv_frame().await.is_some());
        assert!(h2.try_recv_frame().is_none());
    }

    #[test]
    fn test_slow_consumer_gets_close_signal() {
        let (handle, mut halves) = test_handle("c1", 1);

        assert!(handle.send(&json!({"n": 1})));
        // Queue full now; the next send must fail and request a close.
        assert!(!handle.send(&json!({"n": 2})));
        let (code, _) = halves.try_recv_close().unwrap();
        assert_eq!(code, close::SLOW_CONSUMER);
    }

    #[test]
    fn test_attach_tracking() {
        let (handle, _halves) = test_handle("c1", 4);
        assert!(!handle.is_attached("S1"));
        handle.attach_session("S1");
        assert!(handle.is_attached("S1"));
    }
}
