//! Inbound frame classification
//!
//! `InboundMessage::parse` never fails. Text that is not a JSON object is
//! surfaced as `Raw` with the original text, and objects whose `type` is
//! missing or unrecognized are surfaced as `Unknown` with the full payload.

use std::time::Duration;

use serde_json::{Map, Value};

/// Key/value body of a JSON frame, including its `type` field
pub type Payload = Map<String, Value>;

/// Heartbeat interval used when the welcome frame does not carry one
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20_000);

// ─────────────────────────────────────────────────────────────────
// Inbound Messages
// ─────────────────────────────────────────────────────────────────

/// A classified frame received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// First frame on a connection, carrying the assigned identity
    Welcome {
        connection_id: String,
        heartbeat_interval: Duration,
        payload: Payload,
    },

    /// Reply to a client `ping`
    Pong { payload: Payload },

    /// Reply to a client `heartbeat`
    HeartbeatAck { payload: Payload },

    /// Server echo of a client `message`
    Echo { payload: Payload },

    /// Frame that was not a JSON object
    Raw(String),

    /// JSON object with a missing or unrecognized `type`
    Unknown {
        kind: Option<String>,
        payload: Payload,
    },
}

impl InboundMessage {
    /// Classify a text frame
    pub fn parse(text: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => return InboundMessage::Raw(text.to_string()),
        };

        let kind = match payload.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return InboundMessage::Unknown { kind: None, payload },
        };

        match kind.as_str() {
            "welcome" => Self::parse_welcome(payload),
            "pong" => InboundMessage::Pong { payload },
            "heartbeat_ack" => InboundMessage::HeartbeatAck { payload },
            "echo" => InboundMessage::Echo { payload },
            _ => InboundMessage::Unknown {
                kind: Some(kind),
                payload,
            },
        }
    }

    /// Classify a binary frame by decoding it as (lossy) UTF-8
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    // A welcome without a connection id cannot establish identity, so it is
    // passed through as unknown rather than half-applied.
    fn parse_welcome(payload: Payload) -> Self {
        let connection_id = match payload.get("connectionId").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                return InboundMessage::Unknown {
                    kind: Some("welcome".to_string()),
                    payload,
                }
            }
        };

        let heartbeat_interval = payload
            .get("heartbeatInterval")
            .and_then(Value::as_f64)
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);

        InboundMessage::Welcome {
            connection_id,
            heartbeat_interval,
            payload,
        }
    }

    /// Message kind as it appeared on the wire
    ///
    /// Unknown frames report their own `type` when they had one.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Welcome { .. } => "welcome",
            InboundMessage::Pong { .. } => "pong",
            InboundMessage::HeartbeatAck { .. } => "heartbeat_ack",
            InboundMessage::Echo { .. } => "echo",
            InboundMessage::Raw(_) => "raw",
            InboundMessage::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    /// Whether this frame proves the server is alive
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            InboundMessage::Pong { .. } | InboundMessage::HeartbeatAck { .. }
        )
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, InboundMessage::Unknown { .. })
    }

    /// Full JSON payload, absent for raw frames
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            InboundMessage::Welcome { payload, .. }
            | InboundMessage::Pong { payload }
            | InboundMessage::HeartbeatAck { payload }
            | InboundMessage::Echo { payload }
            | InboundMessage::Unknown { payload, .. } => Some(payload),
            InboundMessage::Raw(_) => None,
        }
    }

    /// String field from the payload
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload()?.get(key)?.as_str()
    }

    /// The `message` text carried by welcome and echo frames
    pub fn text(&self) -> Option<&str> {
        self.str_field("message")
    }

    /// Connection id carried by the frame, if any
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Welcome { connection_id, .. } => Some(connection_id),
            _ => self.str_field("connectionId"),
        }
    }

    /// Number of active connections reported by an echo
    pub fn connections(&self) -> Option<u64> {
        self.payload()?.get("connections")?.as_u64()
    }

    /// The server's `timestamp` field, rendered as text
    pub fn timestamp(&self) -> Option<String> {
        match self.payload()?.get("timestamp")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_frame() {
        let msg = InboundMessage::parse(
            r#"{"type":"welcome","message":"hi","connectionId":"abc","heartbeatInterval":20000}"#,
        );
        match &msg {
            InboundMessage::Welcome {
                connection_id,
                heartbeat_interval,
                ..
            } => {
                assert_eq!(connection_id, "abc");
                assert_eq!(*heartbeat_interval, Duration::from_secs(20));
            }
            other => panic!("Expected welcome, got {:?}", other),
        }
        assert_eq!(msg.text(), Some("hi"));
        assert_eq!(msg.connection_id(), Some("abc"));
    }

    #[test]
    fn test_welcome_without_interval_uses_default() {
        let msg = InboundMessage::parse(r#"{"type":"welcome","connectionId":"c1"}"#);
        match msg {
            InboundMessage::Welcome { heartbeat_interval, .. } => {
                assert_eq!(heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
            }
            other => panic!("Expected welcome, got {:?}", other),
        }
    }

    #[test]
    fn test_welcome_with_invalid_interval_uses_default() {
        for interval in ["0", "-5", "\"fast\""] {
            let text = format!(
                r#"{{"type":"welcome","connectionId":"c1","heartbeatInterval":{}}}"#,
                interval
            );
            match InboundMessage::parse(&text) {
                InboundMessage::Welcome { heartbeat_interval, .. } => {
                    assert_eq!(heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL, "{}", interval);
                }
                other => panic!("Expected welcome, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_welcome_without_connection_id_is_unknown() {
        let msg = InboundMessage::parse(r#"{"type":"welcome","heartbeatInterval":1000}"#);
        assert!(msg.is_unknown());
        assert_eq!(msg.kind(), "welcome");
        assert!(msg.payload().unwrap().contains_key("heartbeatInterval"));
    }

    #[test]
    fn test_liveness_frames() {
        let pong = InboundMessage::parse(r#"{"type":"pong","connectionId":"abc","timestamp":1700000000.5}"#);
        assert!(matches!(pong, InboundMessage::Pong { .. }));
        assert!(pong.is_liveness());
        assert_eq!(pong.connection_id(), Some("abc"));
        assert_eq!(pong.timestamp().as_deref(), Some("1700000000.5"));

        let ack = InboundMessage::parse(r#"{"type":"heartbeat_ack"}"#);
        assert!(matches!(ack, InboundMessage::HeartbeatAck { .. }));
        assert!(ack.is_liveness());
    }

    #[test]
    fn test_echo_frame() {
        let msg = InboundMessage::parse(
            r#"{"type":"echo","message":"hello","timestamp":"2024-01-01T00:00:00Z","connections":3,"connectionId":"abc"}"#,
        );
        assert!(matches!(msg, InboundMessage::Echo { .. }));
        assert!(!msg.is_liveness());
        assert_eq!(msg.text(), Some("hello"));
        assert_eq!(msg.connections(), Some(3));
        assert_eq!(msg.timestamp().as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_unrecognized_type_is_unknown_with_payload() {
        let msg = InboundMessage::parse(r#"{"type":"presence","users":["a","b"]}"#);
        match &msg {
            InboundMessage::Unknown { kind, payload } => {
                assert_eq!(kind.as_deref(), Some("presence"));
                assert_eq!(payload["users"][1], "b");
            }
            other => panic!("Expected unknown, got {:?}", other),
        }
        assert_eq!(msg.kind(), "presence");
    }

    #[test]
    fn test_missing_or_non_string_type_is_unknown() {
        let msg = InboundMessage::parse(r#"{"data":"no type here"}"#);
        assert!(matches!(msg, InboundMessage::Unknown { kind: None, .. }));
        assert_eq!(msg.kind(), "unknown");

        let msg = InboundMessage::parse(r#"{"type":42}"#);
        assert!(matches!(msg, InboundMessage::Unknown { kind: None, .. }));
    }

    #[test]
    fn test_non_json_is_raw_and_unchanged() {
        for text in ["Hello from the raw sender", "", "{not json", "  padded  "] {
            assert_eq!(InboundMessage::parse(text), InboundMessage::Raw(text.to_string()));
        }
    }

    #[test]
    fn test_json_that_is_not_an_object_is_raw() {
        for text in ["42", "[1,2,3]", "\"quoted\"", "null"] {
            let msg = InboundMessage::parse(text);
            assert_eq!(msg, InboundMessage::Raw(text.to_string()));
            assert!(msg.payload().is_none());
        }
    }

    #[test]
    fn test_binary_frames_are_decoded() {
        let msg = InboundMessage::parse_bytes(br#"{"type":"heartbeat_ack"}"#);
        assert!(msg.is_liveness());

        let msg = InboundMessage::parse_bytes(&[0xff, 0xfe]);
        assert!(matches!(msg, InboundMessage::Raw(_)));
    }
}
