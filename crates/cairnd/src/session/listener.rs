//! Inbound connection listener.
//!
//! Accepts TCP connections, registers the peer with the file registry and
//! runs each session on its own task. Admission is bounded: once
//! `max_sessions` sessions are live, further connections wait in the
//! kernel backlog until one finishes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinSet;

use cairn_core::PeerIdentity;
use cairn_services::FileRegistry;

use super::{CloseReason, PeerSession, SessionLimits, SessionTable};
use crate::dispatch::CommandDispatcher;

pub struct Listener {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    registry: FileRegistry,
    sessions: SessionTable,
    limits: SessionLimits,
    max_sessions: usize,
    shutdown: broadcast::Receiver<()>,
}

impl Listener {
    /// Bind `addr` and build a listener on it.
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<CommandDispatcher>,
        registry: FileRegistry,
        sessions: SessionTable,
        limits: SessionLimits,
        max_sessions: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self::new(
            listener,
            dispatcher,
            registry,
            sessions,
            limits,
            max_sessions,
            shutdown,
        ))
    }

    pub fn new(
        listener: TcpListener,
        dispatcher: Arc<CommandDispatcher>,
        registry: FileRegistry,
        sessions: SessionTable,
        limits: SessionLimits,
        max_sessions: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            registry,
            sessions,
            limits,
            max_sessions: max_sessions.max(1),
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept until shutdown, then close every session and wait for them.
    pub async fn run(mut self) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_sessions));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks: JoinSet<CloseReason> = JoinSet::new();

        tracing::info!(addr = %self.local_addr()?, max_sessions = self.max_sessions, "listening");

        loop {
            while let Some(done) = tasks.try_join_next() {
                log_join(done);
            }

            let permit = tokio::select! {
                _ = self.shutdown.recv() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let (stream, remote) = tokio::select! {
                _ = self.shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            let peer = PeerIdentity::from(remote);
            let session = self.admit(peer, stream, stop_rx.clone());
            tasks.spawn(async move {
                let reason = session.run().await;
                drop(permit);
                reason
            });
        }

        tracing::info!(active = tasks.len(), "listener stopped accepting, closing sessions");
        // Receivers may all be gone already; that is fine.
        let _ = stop_tx.send(true);
        while let Some(done) = tasks.join_next().await {
            log_join(done);
        }
        tracing::info!("all sessions closed");
        Ok(())
    }

    fn admit(
        &self,
        peer: PeerIdentity,
        stream: TcpStream,
        stop: watch::Receiver<bool>,
    ) -> PeerSession<TcpStream> {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        self.registry.ensure_peer(peer);
        tracing::info!(%peer, "peer connected");

        PeerSession::new(
            peer,
            stream,
            Arc::clone(&self.dispatcher),
            self.registry.clone(),
            self.sessions.clone(),
            self.limits,
            stop,
        )
    }
}

fn log_join(done: Result<CloseReason, tokio::task::JoinError>) {
    if let Err(e) = done {
        tracing::error!(error = %e, "session task failed");
    }
}
