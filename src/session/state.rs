//! Session connection state

use std::fmt;

/// Connection state of a session
///
/// `Connecting` and `Closing` only exist for the duration of `connect` and
/// `close`; callers normally observe `Disconnected`, `Open` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection attempt yet
    #[default]
    Disconnected,
    /// Transport handshake in progress
    Connecting,
    /// Handshake complete, frames flow in both directions
    Open,
    /// Close requested, tasks being torn down
    Closing,
    /// Terminal state; a new session is needed to reconnect
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        *self == SessionState::Open
    }

    /// Closing or closed
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }

    #[test]
    fn test_only_open_is_open() {
        assert!(SessionState::Open.is_open());
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert!(!state.is_open(), "{}", state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closing.is_terminal());
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Open.is_terminal());
    }
}
