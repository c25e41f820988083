//! Session lifecycle.

use std::fmt;

/// `Connected` → `Closing` → `Closed`. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connected, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }
}

/// Why a session left `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent the exit sentinel.
    Exit,
    /// Clean end of stream.
    Disconnected,
    /// The daemon is shutting down.
    Shutdown,
    /// No frame arrived, or a response could not be written, within the
    /// idle timeout.
    IdleTimeout,
    /// Reset, truncated or malformed frame, or a failed write.
    ConnectionError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Exit => "exit",
            CloseReason::Disconnected => "disconnected",
            CloseReason::Shutdown => "shutdown",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::ConnectionError => "connection error",
        };
        f.write_str(text)
    }
}
