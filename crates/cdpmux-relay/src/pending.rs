//! Pending request table.
//!
//! Each forwarded command is held here under its relay-assigned id until
//! exactly one terminal signal fires: response, timeout, extension loss, or
//! relay drain. Exactly-once is enforced by taking-and-removing the entry
//! under the lock; whoever gets the entry owns delivery.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

/// An in-flight command forwarded to the extension.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Originating client, or `None` for internally issued requests.
    pub client_id: Option<String>,
    /// The id the client used; echoed back verbatim on completion.
    pub client_request_id: Value,
    /// CDP method name, kept for timeout error messages.
    pub method: String,
    /// Extension connect-epoch at dispatch time.
    pub epoch: u64,
}

/// Table of pending requests keyed by relay id.
#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, relay_id: u64, request: PendingRequest) {
        self.inner.lock().insert(relay_id, request);
    }

    /// Remove and return the entry, if still present.
    pub fn take(&self, relay_id: u64) -> Option<PendingRequest> {
        self.inner.lock().remove(&relay_id)
    }

    /// Remove and return every entry dispatched under the given epoch.
    pub fn take_epoch(&self, epoch: u64) -> Vec<PendingRequest> {
        let mut inner = self.inner.lock();
        let ids: Vec<u64> = inner
            .iter()
            .filter(|(_, req)| req.epoch == epoch)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter_map(|id| inner.remove(&id)).collect()
    }

    /// Remove every entry originated by the given client. Used on client
    /// disconnect; the entries are dropped without error delivery because
    /// the socket is gone.
    pub fn take_client(&self, client_id: &str) -> Vec<PendingRequest> {
        let mut inner = self.inner.lock();
        let ids: Vec<u64> = inner
            .iter()
            .filter(|(_, req)| req.client_id.as_deref() == Some(client_id))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter_map(|id| inner.remove(&id)).collect()
    }

    /// Remove and return everything. Used during relay drain.
    pub fn take_all(&self) -> Vec<PendingRequest> {
        self.inner.lock().drain().map(|(_, req)| req).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
