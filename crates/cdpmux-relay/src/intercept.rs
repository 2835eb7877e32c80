//! Locally-answered CDP methods.
//!
//! A narrow, fixed set of browser-scoped methods is answered from the
//! target table without touching the extension; everything else forwards.

use serde_json::{json, Value};

use cdpmux_protocol::{error_frame, event_frame, methods, result_frame, CdpCommand, CdpErrorBody};

use crate::clients::ClientHandle;
use crate::state::RelayState;

/// Answer the command locally if it is one of the intercepted methods.
/// Returns true when a reply was produced.
pub(crate) fn handle(state: &RelayState, client: &ClientHandle, cmd: &CdpCommand) -> bool {
    match cmd.method.as_str() {
        methods::TARGET_GET_TARGETS => {
            let infos: Vec<Value> = state
                .targets
                .snapshot()
                .into_iter()
                .map(|entry| json!(entry.info))
                .collect();
            client.send(&result_frame(&cmd.id, json!({ "targetInfos": infos })));
            true
        }
        methods::TARGET_GET_TARGET_INFO => {
            let info = target_id_param(cmd)
                .and_then(|target_id| state.targets.get(target_id))
                .map(|entry| json!(entry.info))
                .unwrap_or(Value::Null);
            client.send(&result_frame(&cmd.id, json!({ "targetInfo": info })));
            true
        }
        methods::TARGET_SET_DISCOVER_TARGETS => {
            // Create/destroy events from the extension are broadcast to
            // every client unconditionally, so this is a plain ack.
            client.send(&result_frame(&cmd.id, json!({})));
            true
        }
        methods::TARGET_ATTACH_TO_TARGET => {
            attach_to_target(state, client, cmd);
            true
        }
        methods::BROWSER_GET_VERSION => {
            let product = format!("cdpmux/{}", env!("CARGO_PKG_VERSION"));
            client.send(&result_frame(
                &cmd.id,
                json!({
                    "protocolVersion": "1.3",
                    "product": &product,
                    "revision": "",
                    "userAgent": &product,
                    "jsVersion": "",
                }),
            ));
            true
        }
        _ => false,
    }
}

fn attach_to_target(state: &RelayState, client: &ClientHandle, cmd: &CdpCommand) {
    let Some(target_id) = target_id_param(cmd) else {
        client.send(&error_frame(
            &cmd.id,
            CdpErrorBody::message("targetId is required for Target.attachToTarget"),
        ));
        return;
    };

    // The extension attaches at target-creation time; attaching a client
    // just hands out the pre-existing session.
    let Some(entry) = state.targets.get(target_id) else {
        client.send(&error_frame(
            &cmd.id,
            CdpErrorBody::message(format!(
                "Target {target_id} not found in connected targets"
            )),
        ));
        return;
    };
    let Some(session_id) = entry.session_id else {
        client.send(&error_frame(
            &cmd.id,
            CdpErrorBody::message(format!(
                "Target {target_id} not found in connected targets"
            )),
        ));
        return;
    };

    client.attach_session(&session_id);
    client.send(&event_frame(
        methods::ATTACHED_TO_TARGET,
        json!({
            "sessionId": &session_id,
            "targetInfo": entry.info,
            "waitingForDebugger": false,
        }),
        None,
    ));
    client.send(&result_frame(&cmd.id, json!({ "sessionId": session_id })));
}

/// Extract a non-empty `targetId` string param.
fn target_id_param(cmd: &CdpCommand) -> Option<&str> {
    cmd.params
        .as_ref()
        .and_then(|params| params.get("targetId"))
        .and_then(|value| value.as_str())
        .filter(|target_id| !target_id.is_empty())
}

#[cfg(test)]
#[path = "intercept_tests.rs"]
mod tests;
