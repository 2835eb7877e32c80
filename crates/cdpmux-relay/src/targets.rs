//! Attached-target table.
//!
//! Derived entirely from extension-side `Target.*` events; mutated only by
//! the extension reader task. The table is the source of truth for the
//! intercepted `Target.*` methods and for `/extension/status`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use cdpmux_protocol::{
    methods, AttachedToTargetParams, CdpEvent, DetachedFromTargetParams, TargetCreatedParams,
    TargetDestroyedParams, TargetInfo,
};

/// One tracked target plus the session the extension attached for it.
#[derive(Debug, Clone, Serialize)]
pub struct TargetEntry {
    #[serde(flatten)]
    pub info: TargetInfo,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Target table keyed by target id.
#[derive(Default)]
pub struct TargetTable {
    inner: Mutex<HashMap<String, TargetEntry>>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an extension event into the table. Non-target events and
    /// malformed params are ignored.
    pub fn observe(&self, event: &CdpEvent) {
        let params = event.params.clone().unwrap_or_default();
        match event.method.as_str() {
            methods::TARGET_CREATED | methods::TARGET_INFO_CHANGED => {
                match serde_json::from_value::<TargetCreatedParams>(params) {
                    Ok(p) => self.upsert(p.target_info, None),
                    Err(e) => warn!(method = %event.method, error = %e, "Dropping malformed target event"),
                }
            }
            methods::ATTACHED_TO_TARGET => {
                match serde_json::from_value::<AttachedToTargetParams>(params) {
                    Ok(p) => self.upsert(p.target_info, Some(p.session_id)),
                    Err(e) => warn!(method = %event.method, error = %e, "Dropping malformed target event"),
                }
            }
            methods::DETACHED_FROM_TARGET => {
                match serde_json::from_value::<DetachedFromTargetParams>(params) {
                    Ok(p) => {
                        let mut inner = self.inner.lock();
                        for entry in inner.values_mut() {
                            if entry.session_id.as_deref() == Some(p.session_id.as_str()) {
                                entry.session_id = None;
                                entry.info.attached = false;
                            }
                        }
                    }
                    Err(e) => warn!(method = %event.method, error = %e, "Dropping malformed target event"),
                }
            }
            methods::TARGET_DESTROYED => {
                match serde_json::from_value::<TargetDestroyedParams>(params) {
                    Ok(p) => {
                        self.inner.lock().remove(&p.target_id);
                    }
                    Err(e) => warn!(method = %event.method, error = %e, "Dropping malformed target event"),
                }
            }
            _ => {}
        }
    }

    fn upsert(&self, info: TargetInfo, session_id: Option<String>) {
        let mut inner = self.inner.lock();
        match inner.get_mut(&info.target_id) {
            Some(entry) => {
                entry.info = info;
                if session_id.is_some() {
                    entry.session_id = session_id;
                    entry.info.attached = true;
                }
            }
            None => {
                let attached = session_id.is_some() || info.attached;
                let mut entry = TargetEntry { info, session_id };
                entry.info.attached = attached;
                inner.insert(entry.info.target_id.clone(), entry);
            }
        }
    }

    /// The session the extension holds for this target, if any.
    pub fn session_for(&self, target_id: &str) -> Option<String> {
        self.inner
            .lock()
            .get(target_id)
            .and_then(|entry| entry.session_id.clone())
    }

    pub fn get(&self, target_id: &str) -> Option<TargetEntry> {
        self.inner.lock().get(target_id).cloned()
    }

    pub fn snapshot(&self) -> Vec<TargetEntry> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod tests;
