//! Session management — one task per connected peer.

pub mod listener;
mod peer;
mod state;

pub use peer::PeerSession;
pub use state::{CloseReason, SessionState};

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use cairn_core::config::CairnConfig;
use cairn_core::PeerIdentity;

/// Metadata about a live session, for status logging.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub peer: PeerIdentity,
    /// When the connection was admitted.
    pub connected_at: Instant,
    /// Commands dispatched so far.
    pub commands: u64,
}

/// Live sessions keyed by peer, shared by the listener, the sessions
/// and the status printer.
pub type SessionTable = Arc<DashMap<PeerIdentity, SessionMeta>>;

pub fn new_session_table() -> SessionTable {
    Arc::new(DashMap::new())
}

/// Per-session limits taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// How long to wait for the next frame or for a response write to
    /// finish. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Bytes per `FileBlock` frame.
    pub block_size: usize,
}

impl SessionLimits {
    pub fn from_config(config: &CairnConfig) -> Self {
        let secs = config.network.idle_timeout_secs;
        Self {
            idle_timeout: (secs > 0).then(|| Duration::from_secs(secs)),
            block_size: config.transfer.block_size,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from_config(&CairnConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_table_creates_empty() {
        let table = new_session_table();
        assert!(table.is_empty());
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let mut config = CairnConfig::default();
        assert_eq!(
            SessionLimits::from_config(&config).idle_timeout,
            Some(Duration::from_secs(300))
        );
        config.network.idle_timeout_secs = 0;
        assert_eq!(SessionLimits::from_config(&config).idle_timeout, None);
    }
}
