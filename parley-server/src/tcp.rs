//! TCP accept loop and per-peer receive loops

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use parley_protocol::{messages, Connection, PeerLine};

use crate::registry::PeerEntry;
use crate::server::ServerShared;

/// How a peer's receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// The peer sent the leave sentinel
    Left,
    /// End of stream or socket error
    Lost,
}

/// Run the TCP accept loop
///
/// Every accepted socket gets its own task in a join set owned by this
/// loop. Once `drain` fires, accepting stops and the loop waits for every
/// peer task to finish before releasing the listener and marking the
/// server closed.
pub(crate) async fn run_accept_loop(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    drain: CancellationToken,
    buffer_size: usize,
) {
    let mut peers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = drain.cancelled() => {
                info!("Drain requested, stopping TCP accept loop");
                break;
            }
            Some(joined) = peers.join_next(), if !peers.is_empty() => {
                log_peer_exit(joined);
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP connection from {}", peer_addr);
                        peers.spawn(handle_peer(
                            stream,
                            Arc::clone(&shared),
                            drain.clone(),
                            buffer_size,
                        ));
                    }
                    Err(e) => {
                        error!("TCP accept error: {}", e);
                    }
                }
            }
        }
    }

    debug!("Waiting for {} peer tasks to finish", peers.len());
    while let Some(joined) = peers.join_next().await {
        log_peer_exit(joined);
    }

    drop(listener);
    shared.finish_close().await;
}

fn log_peer_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Peer task panicked: {}", e);
        }
    }
}

/// Handshake, register, relay until departure, clean up
async fn handle_peer(
    stream: TcpStream,
    shared: Arc<ServerShared>,
    drain: CancellationToken,
    buffer_size: usize,
) {
    let connection = Arc::new(Connection::new(stream, buffer_size));
    let peer_addr = connection.peer_addr();

    // The first line is the username
    let username = tokio::select! {
        biased;
        _ = drain.cancelled() => {
            debug!("Drain started during handshake with {:?}", peer_addr);
            connection.close().await;
            return;
        }
        result = connection.read_line() => match result {
            Ok(Some(username)) => username,
            Ok(None) => {
                debug!("{:?} closed before sending a username", peer_addr);
                connection.close().await;
                return;
            }
            Err(e) => {
                debug!("Handshake with {:?} failed: {}", peer_addr, e);
                connection.close().await;
                return;
            }
        }
    };

    let entry = PeerEntry {
        id: shared.registry.next_id(),
        username,
        connection: Arc::clone(&connection),
    };

    if let Err(e) = shared.registry.add(entry.clone()).await {
        debug!("Discarding {} from {:?}: {}", entry.username, peer_addr, e);
        connection.close().await;
        return;
    }

    info!(peer = %entry.id, addr = ?peer_addr, "{} joined", entry.username);
    let joined = messages::joined(&entry.username);
    shared.registry.announce_except(entry.id, &joined).await;
    shared.observer.display_line(&joined);

    let departure = receive_loop(&shared, &entry).await;

    // Exactly one cleanup per peer: remove and close, then tell the rest
    shared.registry.remove_and_close(entry.id).await;

    let farewell = match departure {
        Departure::Left => messages::left(&entry.username),
        Departure::Lost => messages::disconnected(&entry.username),
    };
    info!(peer = %entry.id, ?departure, "{} is gone", entry.username);
    shared.registry.broadcast_all(&farewell).await;
    shared.observer.display_line(&farewell);
}

async fn receive_loop(shared: &ServerShared, entry: &PeerEntry) -> Departure {
    loop {
        match entry.connection.read_line().await {
            Ok(Some(line)) => match PeerLine::classify(line) {
                PeerLine::Leave => return Departure::Left,
                PeerLine::Empty => continue,
                PeerLine::Chat(text) => {
                    debug!(peer = %entry.id, "relaying {} chars", text.chars().count());
                    shared.registry.broadcast_except(entry, &text).await;
                    shared
                        .observer
                        .display_line(&messages::chat_line(&entry.username, &text));
                }
            },
            Ok(None) => {
                debug!(peer = %entry.id, "end of stream");
                return Departure::Lost;
            }
            Err(e) => {
                warn!(peer = %entry.id, "connection to {} failed: {}", entry.username, e);
                return Departure::Lost;
            }
        }
    }
}
