//! Per-peer command loop.
//!
//! A session reads one frame at a time, verifies its envelope, dispatches
//! the command on the blocking pool and writes the typed response before
//! reading the next frame, so commands from one peer are handled strictly
//! in order. However the loop ends, the peer's registry entry is released.
//!
//! Shutdown is observed while reading and while writing. A peer that stops
//! reading its responses is dropped after the idle timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use cairn_core::transport::{read_frame, send_response};
use cairn_core::wire::EXIT_SENTINEL;
use cairn_core::{envelope, ErrorKind, Frame, FrameKind, PeerIdentity, Response, WireError};
use cairn_services::{CommandContext, FileRegistry};

use super::{CloseReason, SessionLimits, SessionMeta, SessionState, SessionTable};
use crate::dispatch::CommandDispatcher;

/// Upper bound on the transport shutdown performed while closing.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// One connected peer.
pub struct PeerSession<S> {
    peer: PeerIdentity,
    stream: S,
    dispatcher: Arc<CommandDispatcher>,
    registry: FileRegistry,
    sessions: SessionTable,
    limits: SessionLimits,
    shutdown: watch::Receiver<bool>,
    state: SessionState,
}

enum Inbound {
    Frame(Frame),
    Eof,
    Idle,
    Failed(WireError),
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        peer: PeerIdentity,
        stream: S,
        dispatcher: Arc<CommandDispatcher>,
        registry: FileRegistry,
        sessions: SessionTable,
        limits: SessionLimits,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            peer,
            stream,
            dispatcher,
            registry,
            sessions,
            limits,
            shutdown,
            state: SessionState::Connected,
        }
    }

    /// Serve the peer until it leaves, then release everything it held.
    pub async fn run(mut self) -> CloseReason {
        self.sessions.insert(
            self.peer,
            SessionMeta {
                peer: self.peer,
                connected_at: Instant::now(),
                commands: 0,
            },
        );

        let reason = self.serve().await;
        self.close(reason).await;
        reason
    }

    async fn serve(&mut self) -> CloseReason {
        loop {
            let inbound = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => return CloseReason::Shutdown,
                inbound = next_inbound(&mut self.stream, self.limits.idle_timeout) => inbound,
            };

            let frame = match inbound {
                Inbound::Frame(frame) => frame,
                Inbound::Eof => return CloseReason::Disconnected,
                Inbound::Idle => return CloseReason::IdleTimeout,
                Inbound::Failed(WireError::ConnectionClosed) => return CloseReason::Disconnected,
                Inbound::Failed(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "unreadable frame");
                    return CloseReason::ConnectionError;
                }
            };

            if frame.kind != FrameKind::Command {
                tracing::warn!(peer = %self.peer, kind = ?frame.kind, "peer sent a non-command frame");
                return CloseReason::ConnectionError;
            }

            let response = match verified_line(&frame.payload) {
                Ok(line) if line.trim() == EXIT_SENTINEL => return CloseReason::Exit,
                Ok(line) => self.dispatch(line).await,
                Err(response) => {
                    tracing::warn!(peer = %self.peer, "discarded command with bad envelope");
                    response
                }
            };

            let send = send_response(&mut self.stream, &response, self.limits.block_size);
            let sent = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => return CloseReason::Shutdown,
                sent = within(self.limits.idle_timeout, send) => sent,
            };
            match sent {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    tracing::warn!(peer = %self.peer, error = %e, "failed to send response");
                    return CloseReason::ConnectionError;
                }
                None => {
                    tracing::warn!(peer = %self.peer, "peer stopped reading its response");
                    return CloseReason::IdleTimeout;
                }
            }
        }
    }

    async fn dispatch(&mut self, line: String) -> Response {
        if let Some(mut meta) = self.sessions.get_mut(&self.peer) {
            meta.commands += 1;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let ctx = CommandContext { peer: self.peer };
        match tokio::task::spawn_blocking(move || dispatcher.dispatch(&ctx, &line)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(peer = %self.peer, kind = %e.kind(), error = %e, "command failed");
                Response::from(e)
            }
            Err(e) => {
                tracing::error!(peer = %self.peer, error = %e, "command handler panicked");
                Response::error(ErrorKind::Io, "The command failed on the server.")
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        self.transition(SessionState::Closing);

        self.registry.unregister_peer(&self.peer);
        self.sessions.remove(&self.peer);
        match tokio::time::timeout(CLOSE_GRACE, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(peer = %self.peer, error = %e, "transport shutdown failed"),
            Err(_) => tracing::debug!(peer = %self.peer, "transport shutdown timed out"),
        }

        self.transition(SessionState::Closed);
        tracing::info!(peer = %self.peer, %reason, "session closed");
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Resolves once shutdown has been requested, including before the call.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means the listener is gone.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Runs `fut` to completion, or gives up after `limit`.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn next_inbound<R>(reader: &mut R, idle: Option<Duration>) -> Inbound
where
    R: AsyncRead + Unpin,
{
    match within(idle, read_frame(reader)).await {
        None => Inbound::Idle,
        Some(Ok(Some(frame))) => Inbound::Frame(frame),
        Some(Ok(None)) => Inbound::Eof,
        Some(Err(e)) => Inbound::Failed(e),
    }
}

/// Verify the envelope and decode the command text. On failure, returns the
/// `Protocol` error to send back instead.
fn verified_line(payload: &[u8]) -> Result<String, Response> {
    let raw = envelope::unwrap(payload).map_err(|e| {
        tracing::debug!(error = %e, "envelope rejected");
        Response::error(
            ErrorKind::Protocol,
            "Message failed its integrity check and was discarded.",
        )
    })?;
    std::str::from_utf8(raw).map(str::to_owned).map_err(|_| {
        Response::error(
            ErrorKind::Protocol,
            "Command is not valid UTF-8 and was discarded.",
        )
    })
}
