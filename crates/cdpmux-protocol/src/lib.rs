//! # cdpmux-protocol
//!
//! Wire types for the cdpmux relay: client-side CDP frames, the thin
//! envelope spoken by the browser extension, and target bookkeeping types.

mod frames;
mod target;

pub use frames::{
    error_frame, event_frame, result_frame, CdpCommand, CdpErrorBody, CdpEvent, ExtensionFrame,
    ExtensionResponse,
};
pub use target::{
    AttachedToTargetParams, DetachedFromTargetParams, TargetCreatedParams, TargetDestroyedParams,
    TargetInfo,
};

/// CDP method names the relay treats specially.
pub mod methods {
    pub const TARGET_GET_TARGETS: &str = "Target.getTargets";
    pub const TARGET_GET_TARGET_INFO: &str = "Target.getTargetInfo";
    pub const TARGET_SET_DISCOVER_TARGETS: &str = "Target.setDiscoverTargets";
    pub const TARGET_ATTACH_TO_TARGET: &str = "Target.attachToTarget";
    pub const BROWSER_GET_VERSION: &str = "Browser.getVersion";

    pub const TARGET_CREATED: &str = "Target.targetCreated";
    pub const TARGET_INFO_CHANGED: &str = "Target.targetInfoChanged";
    pub const TARGET_DESTROYED: &str = "Target.targetDestroyed";
    pub const ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";
    pub const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";
}

/// WebSocket close codes used by the relay (private-use range).
pub mod close {
    /// A newer extension connection replaced this one.
    pub const SUPERSEDED: u16 = 4901;
    pub const SUPERSEDED_REASON: &str = "SUPERSEDED";

    /// The extension went away; client sessions cannot outlive it.
    pub const EXTENSION_GONE: u16 = 4902;
    pub const EXTENSION_GONE_REASON: &str = "EXTENSION_GONE";

    /// The peer's write queue overflowed.
    pub const SLOW_CONSUMER: u16 = 4903;
    pub const SLOW_CONSUMER_REASON: &str = "SLOW_CONSUMER";

    /// Normal "going away" close used during relay shutdown.
    pub const GOING_AWAY: u16 = 1001;
    pub const GOING_AWAY_REASON: &str = "relay shutting down";
}
