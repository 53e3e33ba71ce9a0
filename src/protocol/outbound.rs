//! Outbound message definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages the client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Free-text message, echoed back by the server
    Message {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Application-level ping, answered with `pong`
    Ping { timestamp: DateTime<Utc> },

    /// Keep-alive probe, answered with `heartbeat_ack`
    Heartbeat { timestamp: DateTime<Utc> },
}

impl OutboundMessage {
    pub fn message(text: impl Into<String>) -> Self {
        OutboundMessage::Message {
            message: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        OutboundMessage::Ping { timestamp: Utc::now() }
    }

    pub fn heartbeat() -> Self {
        OutboundMessage::Heartbeat { timestamp: Utc::now() }
    }

    /// Wire `type` of this message
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Message { .. } => "message",
            OutboundMessage::Ping { .. } => "ping",
            OutboundMessage::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OutboundMessage::Message { timestamp, .. }
            | OutboundMessage::Ping { timestamp }
            | OutboundMessage::Heartbeat { timestamp } => *timestamp,
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn as_value(msg: &OutboundMessage) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_message_shape() {
        let value = as_value(&OutboundMessage::message("Hello, hibernation test!"));
        assert_eq!(value["type"], "message");
        assert_eq!(value["message"], "Hello, hibernation test!");
        assert!(value["timestamp"].is_string());
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_ping_and_heartbeat_shape() {
        for (msg, kind) in [
            (OutboundMessage::ping(), "ping"),
            (OutboundMessage::heartbeat(), "heartbeat"),
        ] {
            let value = as_value(&msg);
            assert_eq!(value["type"], kind);
            assert_eq!(msg.kind(), kind);
            assert!(value["timestamp"].is_string());
            assert_eq!(value.as_object().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let msg = OutboundMessage::ping();
        let value = as_value(&msg);
        let parsed: DateTime<Utc> = value["timestamp"].as_str().unwrap().parse().unwrap();
        assert_eq!(parsed, msg.timestamp());
    }
}
