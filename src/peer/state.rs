//! Peer state module
//!
//! Lifecycle of a single peer session.

use std::fmt;

/// Represents the state of a peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection, or the connection was closed
    #[default]
    Disconnected,
    /// TCP connection established
    Connected,
    /// Handshake exchanged and validated
    Handshaked,
    /// Peer has unchoked us; requests may be sent
    Unchoked,
}

impl SessionState {
    /// Check if the session holds an open connection
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    /// Check if messages may be exchanged
    pub fn is_handshaked(&self) -> bool {
        matches!(self, SessionState::Handshaked | SessionState::Unchoked)
    }

    /// Check if block requests may be sent
    pub fn can_request(&self) -> bool {
        matches!(self, SessionState::Unchoked)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Handshaked => "handshaked",
            SessionState::Unchoked => "unchoked",
        };
        f.write_str(name)
    }
}
