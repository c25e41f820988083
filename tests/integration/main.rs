//! Cairn integration test harness.
//!
//! Every test starts its own tracker in-process on an ephemeral loopback
//! port, with a scratch file store, and talks to it through the real client
//! over TCP. Tests share nothing and can run in parallel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cairn_core::PeerIdentity;
use cairn_ctl::TrackerClient;
use cairn_services::{FileRegistry, FileStore};
use cairnd::{new_session_table, CommandDispatcher, Listener, SessionLimits, SessionTable};

mod lifecycle;
mod tracker;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Tracker {
    pub addr: SocketAddr,
    pub registry: FileRegistry,
    pub sessions: SessionTable,
    pub store: FileStore,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
    _dir: tempfile::TempDir,
}

impl Tracker {
    pub async fn start() -> Result<Self> {
        Self::start_with(SessionLimits::default(), 16).await
    }

    pub async fn start_with(limits: SessionLimits, max_sessions: usize) -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create scratch dir")?;
        let store = FileStore::new(dir.path().join("tracked-files"))?;
        let registry = FileRegistry::new();
        let sessions = new_session_table();
        let dispatcher = Arc::new(CommandDispatcher::standard(registry.clone(), store.clone()));
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let listener = Listener::bind(
            "127.0.0.1:0".parse()?,
            dispatcher,
            registry.clone(),
            sessions.clone(),
            limits,
            max_sessions,
            shutdown_rx,
        )
        .await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(listener.run());

        Ok(Self {
            addr,
            registry,
            sessions,
            store,
            shutdown,
            task,
            _dir: dir,
        })
    }

    /// Connect a new peer from a random local port.
    pub async fn connect(&self) -> Result<TrackerClient> {
        TrackerClient::connect(self.addr, None).await
    }

    /// Signal shutdown and wait for every session to be closed.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.send(()).ok();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .context("listener did not stop in time")??
    }
}

pub fn identity(client: &TrackerClient) -> PeerIdentity {
    PeerIdentity::from(client.local_addr())
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
