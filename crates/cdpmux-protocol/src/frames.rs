//! CDP frame types and message builders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A CDP command as received from a client.
///
/// The `id` is kept as a raw JSON value: clients are free to use any JSON
/// id space and the relay must echo ids back byte-for-byte.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpCommand {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// A frame arriving from the extension socket.
///
/// The extension speaks a thin envelope with exactly two classes: command
/// responses (carry the relay-assigned `id`) and CDP events (carry `method`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtensionFrame {
    Response(ExtensionResponse),
    Event(CdpEvent),
}

/// Response to a relay-forwarded command.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpErrorBody>,
}

/// A CDP event, from either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// CDP error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

/// Build a success response frame for a client.
pub fn result_frame(id: &Value, result: Value) -> Value {
    json!({ "id": id, "result": result })
}

/// Build an error response frame for a client.
pub fn error_frame(id: &Value, error: CdpErrorBody) -> Value {
    json!({ "id": id, "error": error })
}

/// Build an event frame for a client.
pub fn event_frame(method: &str, params: Value, session_id: Option<&str>) -> Value {
    match session_id {
        Some(sid) => json!({ "method": method, "params": params, "sessionId": sid }),
        None => json!({ "method": method, "params": params }),
    }
}

impl CdpErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_with_numeric_id() {
        let cmd: CdpCommand =
            serde_json::from_str(r#"{"id":7,"method":"Page.navigate","params":{"url":"x"}}"#)
                .unwrap();
        assert_eq!(cmd.id, json!(7));
        assert_eq!(cmd.method, "Page.navigate");
        assert!(cmd.session_id.is_none());
    }

    #[test]
    fn test_command_with_string_id_and_session() {
        let cmd: CdpCommand =
            serde_json::from_str(r#"{"id":"a-1","method":"Page.enable","sessionId":"S1"}"#)
                .unwrap();
        assert_eq!(cmd.id, json!("a-1"));
        assert_eq!(cmd.session_id.as_deref(), Some("S1"));
        assert!(cmd.params.is_none());
    }

    #[test]
    fn test_command_without_id_is_rejected() {
        let result = serde_json::from_str::<CdpCommand>(r#"{"method":"Page.enable"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_extension_frame_response() {
        let frame: ExtensionFrame =
            serde_json::from_str(r#"{"id":42,"result":{"frameId":"F"}}"#).unwrap();
        match frame {
            ExtensionFrame::Response(resp) => {
                assert_eq!(resp.id, 42);
                assert_eq!(resp.result.unwrap()["frameId"], "F");
                assert!(resp.error.is_none());
            }
            ExtensionFrame::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_extension_frame_error_response() {
        let frame: ExtensionFrame =
            serde_json::from_str(r#"{"id":9,"error":{"code":-32000,"message":"nope"}}"#).unwrap();
        match frame {
            ExtensionFrame::Response(resp) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, Some(-32000));
                assert_eq!(err.message, "nope");
            }
            ExtensionFrame::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_extension_frame_event() {
        let frame: ExtensionFrame = serde_json::from_str(
            r#"{"method":"Page.loadEventFired","params":{"timestamp":1.0},"sessionId":"S1"}"#,
        )
        .unwrap();
        match frame {
            ExtensionFrame::Event(ev) => {
                assert_eq!(ev.method, "Page.loadEventFired");
                assert_eq!(ev.session_id.as_deref(), Some("S1"));
            }
            ExtensionFrame::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_extension_frame_event_without_session() {
        let frame: ExtensionFrame =
            serde_json::from_str(r#"{"method":"Target.targetCreated","params":{}}"#).unwrap();
        match frame {
            ExtensionFrame::Event(ev) => assert!(ev.session_id.is_none()),
            ExtensionFrame::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_result_frame_echoes_id() {
        let frame = result_frame(&json!("client-3"), json!({"ok": true}));
        assert_eq!(frame["id"], "client-3");
        assert_eq!(frame["result"]["ok"], true);
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = error_frame(&json!(11), CdpErrorBody::message("Extension not connected"));
        assert_eq!(frame["id"], 11);
        assert_eq!(frame["error"]["message"], "Extension not connected");
        assert!(frame["error"].get("code").is_none());
    }

    #[test]
    fn test_event_frame_omits_absent_session() {
        let frame = event_frame("Target.targetCreated", json!({}), None);
        assert!(frame.get("sessionId").is_none());

        let frame = event_frame("Page.loadEventFired", json!({}), Some("S1"));
        assert_eq!(frame["sessionId"], "S1");
    }
}
