//! Peer registry
//!
//! Tracks the peers whose receive loops are running and fans lines out to
//! them. The map sits behind an async read/write lock: add, remove and
//! seal take the write lock, broadcasts hold the read lock while they
//! write. A peer is therefore never written to while it is being removed
//! and closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_protocol::{messages, Connection};
use parley_utils::{ParleyError, Result};

/// Unique peer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a ClientId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

/// A registered peer
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub id: ClientId,
    pub username: String,
    pub connection: Arc<Connection>,
}

#[derive(Debug, Default)]
struct Peers {
    by_id: HashMap<ClientId, PeerEntry>,
    /// Set while draining; no new peers are admitted
    sealed: bool,
}

/// Registry of connected peers, owned by the broadcast server
pub struct PeerRegistry {
    peers: RwLock<Peers>,
    next_client_id: AtomicU64,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(Peers::default()),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh identity
    ///
    /// Unique for the lifetime of the registry, including across concurrent
    /// accepts.
    pub fn next_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst))
    }

    // ==================== Membership ====================

    /// Register a peer
    ///
    /// Fails if the identity is already present or the registry has been
    /// sealed for draining.
    pub async fn add(&self, entry: PeerEntry) -> Result<()> {
        let mut peers = self.peers.write().await;

        if peers.sealed {
            return Err(ParleyError::RegistrySealed);
        }
        if peers.by_id.contains_key(&entry.id) {
            return Err(ParleyError::PeerExists(entry.id.to_string()));
        }

        debug!("Registered {} as {}", entry.username, entry.id);
        peers.by_id.insert(entry.id, entry);
        Ok(())
    }

    /// Remove a peer and return its entry
    pub async fn remove(&self, id: ClientId) -> Result<PeerEntry> {
        let mut peers = self.peers.write().await;
        let entry = peers
            .by_id
            .remove(&id)
            .ok_or_else(|| ParleyError::PeerNotFound(id.to_string()))?;

        debug!("Unregistered {} ({})", entry.username, id);
        Ok(entry)
    }

    /// Remove a peer and close its socket under one write lock
    ///
    /// Returns `false` if the peer was already gone, which happens when two
    /// cleanup paths race; the second one is a no-op.
    pub async fn remove_and_close(&self, id: ClientId) -> bool {
        let mut peers = self.peers.write().await;
        match peers.by_id.remove(&id) {
            Some(entry) => {
                entry.connection.close().await;
                debug!("Removed and closed {} ({})", entry.username, id);
                true
            }
            None => false,
        }
    }

    /// Stop admitting peers
    pub async fn seal(&self) {
        self.peers.write().await.sealed = true;
    }

    /// Close and drop every peer, then admit new peers again
    pub async fn reset(&self) {
        let mut peers = self.peers.write().await;
        for (_, entry) in peers.by_id.drain() {
            entry.connection.close().await;
        }
        peers.sealed = false;
    }

    pub async fn count(&self) -> usize {
        self.peers.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.by_id.is_empty()
    }

    pub async fn usernames(&self) -> Vec<String> {
        self.peers
            .read()
            .await
            .by_id
            .values()
            .map(|entry| entry.username.clone())
            .collect()
    }

    // ==================== Message Delivery ====================

    /// Relay chat text from `sender` to every other peer as
    /// `"<sender name>: <text>"`
    ///
    /// Returns the number of peers that received the line.
    pub async fn broadcast_except(&self, sender: &PeerEntry, text: &str) -> usize {
        let line = messages::chat_line(&sender.username, text);
        self.send_line(Some(sender.id), &line).await
    }

    /// Send a preformatted line to every peer except `except`
    pub async fn announce_except(&self, except: ClientId, line: &str) -> usize {
        self.send_line(Some(except), line).await
    }

    /// Send a preformatted line to every peer
    pub async fn broadcast_all(&self, line: &str) -> usize {
        self.send_line(None, line).await
    }

    /// Failed writes are logged and skipped. The failing peer's own receive
    /// loop notices the dead socket and runs its cleanup.
    ///
    /// The read lock is held across every write, so a removed peer is never
    /// written to after `remove_and_close` returns. The cost: a peer whose
    /// socket buffer is full stalls the broadcast, and because tokio's
    /// `RwLock` is write-preferring, a queued add or remove then blocks
    /// later broadcasts as well. There is no per-peer send timeout.
    async fn send_line(&self, except: Option<ClientId>, line: &str) -> usize {
        let peers = self.peers.read().await;
        let mut success_count = 0;

        for (id, entry) in peers.by_id.iter() {
            if Some(*id) == except {
                continue;
            }
            match entry.connection.write_line(line).await {
                Ok(()) => success_count += 1,
                Err(e) => warn!("Delivery to {} ({}) failed: {}", entry.username, id, e),
            }
        }

        debug!("Delivered line to {} peers", success_count);
        success_count
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("next_client_id", &self.next_client_id.load(Ordering::SeqCst))
            .finish()
    }
}
