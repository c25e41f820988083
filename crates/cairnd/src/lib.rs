//! cairnd — Cairn file tracker daemon.
//!
//! The binary wires configuration and signals; everything it runs lives
//! here so the integration tests can drive a tracker in-process.

pub mod dispatch;
pub mod session;

pub use dispatch::CommandDispatcher;
pub use session::listener::Listener;
pub use session::{new_session_table, CloseReason, PeerSession, SessionLimits, SessionTable};
