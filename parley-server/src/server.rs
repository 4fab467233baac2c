//! Broadcast server lifecycle
//!
//! `Idle -> Listening -> Draining -> Closed`. A closed server can listen
//! again. Draining starts with `send_to_all("exit")`: the registry stops
//! admitting peers, every peer is told `Server: exit`, and the server
//! closes once the last peer task has finished.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_protocol::messages::{self, status};
use parley_protocol::{SharedObserver, EXIT, SERVER_EXIT};
use parley_utils::{ParleyError, Result};

use crate::config::ServerConfig;
use crate::registry::PeerRegistry;
use crate::tcp;

/// Server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    Draining,
    Closed,
}

impl ServerState {
    /// Listening or draining
    pub fn is_active(self) -> bool {
        matches!(self, Self::Listening | Self::Draining)
    }
}

/// State shared with the accept loop and peer tasks
pub(crate) struct ServerShared {
    pub(crate) registry: PeerRegistry,
    pub(crate) observer: SharedObserver,
    state: watch::Sender<ServerState>,
}

impl ServerShared {
    /// Final step of a drain, run by the accept loop
    pub(crate) async fn finish_close(&self) {
        self.registry.reset().await;
        self.observer.display_line(status::SERVER_STOPPED);
        self.observer.on_server_state_changed(false);
        self.state.send_replace(ServerState::Closed);
        info!("Server closed");
    }
}

/// One listen..close cycle
struct ListenSession {
    local_addr: SocketAddr,
    drain: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// Multi-client chat broadcaster
pub struct BroadcastServer {
    shared: Arc<ServerShared>,
    session: Mutex<Option<ListenSession>>,
}

impl BroadcastServer {
    pub fn new(observer: SharedObserver) -> Self {
        let (state, _) = watch::channel(ServerState::Idle);
        Self {
            shared: Arc::new(ServerShared {
                registry: PeerRegistry::new(),
                observer,
                state,
            }),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.shared.state.borrow()
    }

    /// Address the listener is bound to, while listening or draining
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        if !self.state().is_active() {
            return None;
        }
        self.session.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Number of registered peers
    pub async fn peer_count(&self) -> usize {
        self.shared.registry.count().await
    }

    /// Bind and start accepting peers
    ///
    /// A bind failure is shown to the user, leaves the server idle and can
    /// be retried.
    pub async fn listen(&self, config: &ServerConfig) -> Result<SocketAddr> {
        let mut session = self.session.lock().await;

        if self.state().is_active() {
            if let Some(current) = session.as_ref() {
                return Err(ParleyError::AlreadyListening(current.local_addr));
            }
        }

        // A previous cycle's accept loop has already marked the server closed
        if let Some(previous) = session.take() {
            let _ = previous.accept_task.await;
        }
        self.shared.state.send_replace(ServerState::Idle);

        let addr = config.socket_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!("Failed to bind TCP listener to {}: {}", addr, e);
                if e.kind() == std::io::ErrorKind::AddrInUse {
                    self.shared.observer.display_line(status::ADDRESS_IN_USE);
                } else {
                    self.shared
                        .observer
                        .display_line(&format!("Cannot listen on {}: {}", addr, e));
                }
                return Err(ParleyError::Bind { addr, source: e });
            }
        };
        let local_addr = listener.local_addr()?;

        self.shared.registry.reset().await;
        self.shared.state.send_replace(ServerState::Listening);
        self.shared.observer.on_server_state_changed(true);
        info!("TCP listener bound to {}", local_addr);

        let drain = CancellationToken::new();
        let accept_task = tokio::spawn(tcp::run_accept_loop(
            listener,
            Arc::clone(&self.shared),
            drain.clone(),
            config.buffer_size,
        ));

        *session = Some(ListenSession {
            local_addr,
            drain,
            accept_task,
        });

        Ok(local_addr)
    }

    /// Send a broadcaster-authored line to every peer
    ///
    /// `"exit"` starts a drain instead of being shown as chat.
    pub async fn send_to_all(&self, text: &str) -> Result<()> {
        if text == EXIT {
            return self.begin_drain().await;
        }

        self.ensure_listening()?;
        let delivered = self
            .shared
            .registry
            .broadcast_all(&messages::server_line(text))
            .await;
        self.shared.observer.display_line(&status::own_line(text));
        info!("Server message delivered to {} peers", delivered);
        Ok(())
    }

    /// Administrative stop
    ///
    /// Drains if peers are connected, otherwise the server closes as soon as
    /// the accept loop observes the request.
    pub async fn stop_listening(&self) -> Result<()> {
        self.send_to_all(EXIT).await
    }

    /// Wait until the server is neither listening nor draining
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| !state.is_active()).await;
    }

    fn ensure_listening(&self) -> Result<()> {
        match self.state() {
            ServerState::Listening => Ok(()),
            ServerState::Draining => Err(ParleyError::Draining),
            ServerState::Idle | ServerState::Closed => Err(ParleyError::NotListening),
        }
    }

    async fn begin_drain(&self) -> Result<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(ParleyError::NotListening);
        };

        let started = self.shared.state.send_if_modified(|state| {
            if *state == ServerState::Listening {
                *state = ServerState::Draining;
                true
            } else {
                false
            }
        });
        if !started {
            return self.ensure_listening();
        }

        self.shared.observer.display_line(status::DISCONNECTING);

        // Seal first so nobody registers after the shutdown line went out
        self.shared.registry.seal().await;
        self.shared.registry.broadcast_all(SERVER_EXIT).await;
        info!(
            "Draining, waiting for {:?} to leave",
            self.shared.registry.usernames().await
        );

        session.drain.cancel();
        Ok(())
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        // Aborting the accept loop drops its join set, which aborts every peer task
        if let Some(session) = self.session.get_mut().take() {
            session.accept_task.abort();
        }
    }
}

impl std::fmt::Debug for BroadcastServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastServer")
            .field("state", &self.state())
            .field("registry", &self.shared.registry)
            .finish()
    }
}
