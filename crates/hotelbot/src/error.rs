use std::path::PathBuf;

use hotelwire::WireError;

use crate::handshake::HandshakeState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// No authenticated marker arrived before the auth timeout.
    Timeout { state: HandshakeState },
    AuthFailed(String),
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeError::Timeout { state } => {
                write!(f, "handshake timed out in state {state:?}")
            }
            HandshakeError::AuthFailed(why) => write!(f, "auth failed: {why}"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Connection-level and startup-level failures. Per-frame and per-record
/// decode errors never become a `SessionError`; they are logged where they
/// happen.
#[derive(Debug)]
pub enum SessionError {
    Handshake(HandshakeError),
    ConnectionClosed(String),
    /// An outbound message could not be encoded (over-long string).
    Wire(WireError),
    Transport(String),
    InstanceAlreadyRunning(PathBuf),
    Ticket(String),
    Config(String),
    /// A session task panicked or was cancelled unexpectedly.
    Task(String),
}

impl SessionError {
    /// True when the connection is gone and the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Wire(_))
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Handshake(e) => write!(f, "{e}"),
            SessionError::ConnectionClosed(why) => write!(f, "connection closed: {why}"),
            SessionError::Wire(e) => write!(f, "encode: {e}"),
            SessionError::Transport(e) => write!(f, "transport: {e}"),
            SessionError::InstanceAlreadyRunning(p) => {
                write!(f, "another instance holds {}", p.display())
            }
            SessionError::Ticket(e) => write!(f, "ticket: {e}"),
            SessionError::Config(e) => write!(f, "config: {e}"),
            SessionError::Task(e) => write!(f, "task: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Handshake(e) => Some(e),
            SessionError::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HandshakeError> for SessionError {
    fn from(e: HandshakeError) -> Self {
        SessionError::Handshake(e)
    }
}

impl From<WireError> for SessionError {
    fn from(e: WireError) -> Self {
        SessionError::Wire(e)
    }
}
