//! File registry — which connected peer holds which files.
//!
//! One reader/writer lock guards the whole map, so a lookup always sees
//! either all or none of a concurrent registration or removal.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use cairn_core::PeerIdentity;

/// Files known to be held by one peer.
#[derive(Debug, Default)]
struct PeerFiles {
    /// Connection order, used for deterministic lookup results.
    seq: u64,
    /// Registered file names, in registration order. No duplicates.
    files: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    peers: HashMap<PeerIdentity, PeerFiles>,
    next_seq: u64,
}

impl Inner {
    fn ensure(&mut self, peer: PeerIdentity) -> &mut PeerFiles {
        let next_seq = &mut self.next_seq;
        self.peers.entry(peer).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            PeerFiles {
                seq,
                files: Vec::new(),
            }
        })
    }
}

/// Shared registry handle. Cloning is cheap and all clones see the same map.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{peer} has already registered '{file}'")]
    Duplicate { peer: PeerIdentity, file: String },
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a newly connected peer. Idempotent.
    pub fn ensure_peer(&self, peer: PeerIdentity) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.peers.contains_key(&peer) {
            inner.ensure(peer);
            tracing::debug!(%peer, "registry entry created");
        }
    }

    /// Record that `peer` holds `file`. A second registration of the same
    /// name is rejected and leaves the set unchanged.
    pub fn register(&self, peer: PeerIdentity, file: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.ensure(peer);
        if entry.files.iter().any(|f| f == file) {
            return Err(RegistryError::Duplicate {
                peer,
                file: file.to_string(),
            });
        }
        entry.files.push(file.to_string());
        tracing::info!(%peer, file, "file registered");
        Ok(())
    }

    /// Drop every trace of `peer`. Safe for peers that never registered.
    pub fn unregister_peer(&self, peer: &PeerIdentity) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = inner.peers.remove(peer) {
            tracing::info!(%peer, files = entry.files.len(), "registry entry released");
        }
    }

    /// Peers holding `file`, in the order they connected.
    pub fn find_peers_with_file(&self, file: &str) -> Vec<PeerIdentity> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<(u64, PeerIdentity)> = inner
            .peers
            .iter()
            .filter(|(_, entry)| entry.files.iter().any(|f| f == file))
            .map(|(peer, entry)| (entry.seq, *peer))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, peer)| peer).collect()
    }

    /// Files registered by `peer`, in registration order. `None` if the
    /// peer has no entry.
    pub fn files_of(&self, peer: &PeerIdentity) -> Option<Vec<String>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.peers.get(peer).map(|entry| entry.files.clone())
    }

    pub fn contains_peer(&self, peer: &PeerIdentity) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.peers.contains_key(peer)
    }

    pub fn peer_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.peers.len()
    }
}
