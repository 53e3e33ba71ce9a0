//! Events delivered from a session to its caller

use std::fmt;

use crate::protocol::InboundMessage;

use super::StaleConnectionWarning;

/// Why a session reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called
    Local,
    /// The server sent a close frame
    Remote { code: Option<u16>, reason: String },
    /// The stream ended without a close frame
    StreamEnded,
    /// The transport failed
    TransportError(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => write!(f, "closed locally"),
            CloseReason::Remote { code: Some(code), reason } if !reason.is_empty() => {
                write!(f, "closed by server ({}: {})", code, reason)
            }
            CloseReason::Remote { code: Some(code), .. } => write!(f, "closed by server ({})", code),
            CloseReason::Remote { code: None, .. } => write!(f, "closed by server"),
            CloseReason::StreamEnded => write!(f, "stream ended"),
            CloseReason::TransportError(message) => write!(f, "transport error: {}", message),
        }
    }
}

/// Events emitted by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A classified inbound frame
    Message(InboundMessage),

    /// Heartbeats have gone unanswered for the whole window
    StaleConnection(StaleConnectionWarning),

    /// Transport failure after the session opened
    Error { message: String, fatal: bool },

    /// The session reached `Closed`
    Closed { reason: CloseReason },
}

impl SessionEvent {
    pub fn as_message(&self) -> Option<&InboundMessage> {
        match self {
            SessionEvent::Message(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionEvent::Closed { .. })
    }
}
