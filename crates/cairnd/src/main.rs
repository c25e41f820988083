//! cairnd — Cairn file tracker daemon.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use cairn_core::config::CairnConfig;
use cairn_services::{FileRegistry, FileStore};

use cairnd::{new_session_table, CommandDispatcher, Listener, SessionLimits};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CairnConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CairnConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CairnConfig::default()
    });

    let listen_addr: SocketAddr = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid listen address '{arg}'"))?,
        None => config.network.listen_addr,
    };
    tracing::info!(%listen_addr, "cairnd starting");

    // Store
    let store = FileStore::new(&config.storage.store_dir).with_context(|| {
        format!("failed to open store {}", config.storage.store_dir.display())
    })?;
    tracing::info!(root = %store.root().display(), files = store.count(), "file store ready");

    // Shared state
    let registry = FileRegistry::new();
    let sessions = new_session_table();
    let dispatcher = Arc::new(CommandDispatcher::standard(registry.clone(), store));
    tracing::info!(commands = ?dispatcher.names(), "commands registered");

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let listener = Listener::bind(
        listen_addr,
        dispatcher,
        registry.clone(),
        sessions.clone(),
        SessionLimits::from_config(&config),
        config.network.max_sessions,
        shutdown_tx.subscribe(),
    )
    .await?;
    let mut listener_task = tokio::spawn(listener.run());

    let session_printer = {
        let sessions = sessions.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                tracing::info!(
                    count = sessions.len(),
                    peers = registry.peer_count(),
                    "session table snapshot"
                );
                for s in sessions.iter() {
                    tracing::info!(
                        peer = %s.peer,
                        connected_secs = s.connected_at.elapsed().as_secs(),
                        commands = s.commands,
                        "  session"
                    );
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
            match (&mut listener_task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "listener failed during shutdown"),
                Err(e) => tracing::error!(error = %e, "listener task panicked"),
            }
        }
        r = &mut listener_task => tracing::error!("listener exited: {:?}", r),
        r = session_printer    => tracing::error!("session printer exited: {:?}", r),
    }

    tracing::info!(peers = registry.peer_count(), "cairnd stopped");
    Ok(())
}
