//! Wire types for the realtime protocol.
//!
//! Everything on the wire is UTF-8 JSON. Clients send small control
//! envelopes; the hub pushes back system frames for its own lifecycle
//! messages and otherwise passes application events through untouched.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hub::ConnId;

/// A fully serialized outbound frame. Serialization happens once per
/// publish; subscribers share the underlying bytes.
pub type Frame = Utf8Bytes;

/// Control envelopes sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Subscribe this connection to a room.
    Join { room: String },
    /// Drop this connection's membership in a room.
    Leave { room: String },
    /// Application-level liveness probe, answered with a pong frame.
    Ping,
}

/// Frames originated by the hub itself, as opposed to application events
/// relayed from publishers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemFrame {
    /// Sent once, immediately after registration.
    Connected { conn_id: ConnId },
    Joined { room: String },
    Left { room: String },
    Pong,
    Error { message: String },
}

impl SystemFrame {
    /// Serialize into an outbound frame. System frames carry only
    /// string-keyed data, so encoding cannot fail in practice; the
    /// fallback keeps the signature total anyway.
    pub fn to_frame(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(json) => Frame::from(json),
            Err(_) => Frame::from(r#"{"type":"error","message":"frame encoding failed"}"#),
        }
    }
}

/// Envelope for application events arriving through the HTTP publish
/// endpoints. Subscribers receive exactly this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event discriminator, e.g. `new_message`, `typing`, `notification`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque event body; the hub never inspects it.
    #[serde(default)]
    pub payload: Value,
}

/// Conventional room keys used by the platform's publishers.
pub mod room {
    /// Message feed of a public topic.
    pub fn topic(topic_id: &str) -> String {
        format!("topic_{topic_id}")
    }

    /// Message feed of a private group.
    pub fn group(group_id: &str) -> String {
        format!("group_{group_id}")
    }

    /// Direct-message inbox of a user.
    pub fn dm(user_id: &str) -> String {
        format!("dm_{user_id}")
    }

    /// Per-user notification channel.
    pub fn user(user_id: &str) -> String {
        format!("user_{user_id}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn control_frames_parse_from_action_envelopes() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"action":"join","room":"topic_42"}"#).unwrap();
        assert!(matches!(frame, ControlFrame::Join { room } if room == "topic_42"));

        let frame: ControlFrame =
            serde_json::from_str(r#"{"action":"leave","room":"group_7"}"#).unwrap();
        assert!(matches!(frame, ControlFrame::Leave { room } if room == "group_7"));

        let frame: ControlFrame = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(frame, ControlFrame::Ping));

        assert!(serde_json::from_str::<ControlFrame>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn system_frames_are_type_tagged() {
        let json = SystemFrame::Joined {
            room: "topic_42".to_string(),
        }
        .to_frame();
        let value: serde_json::Value = serde_json::from_str(json.as_str()).unwrap();
        assert_eq!(value["type"], "joined");
        assert_eq!(value["room"], "topic_42");

        let json = SystemFrame::Pong.to_frame();
        let value: serde_json::Value = serde_json::from_str(json.as_str()).unwrap();
        assert_eq!(value["type"], "pong");
    }

    #[test]
    fn event_envelope_round_trips() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "new_message",
            "payload": {"id": "m1", "content": "hi"}
        }))
        .unwrap();
        assert_eq!(envelope.kind, "new_message");
        assert_eq!(envelope.payload["id"], "m1");

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "new_message");
        assert_eq!(value["payload"]["content"], "hi");
    }

    #[test]
    fn room_keys_follow_platform_conventions() {
        assert_eq!(room::topic("42"), "topic_42");
        assert_eq!(room::group("7"), "group_7");
        assert_eq!(room::dm("u1"), "dm_u1");
        assert_eq!(room::user("u1"), "user_u1");
    }
}
