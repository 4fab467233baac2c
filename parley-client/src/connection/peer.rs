//! Chat peer state machine

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_protocol::messages::status;
use parley_protocol::{Connection, ConnectionError, ServerLine, SharedObserver, EXIT};
use parley_utils::{ParleyError, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
}

/// One connected session
struct ChatSession {
    connection: Arc<Connection>,
    receiver: JoinHandle<()>,
}

/// State shared with the receive task
struct PeerShared {
    observer: SharedObserver,
    state: watch::Sender<PeerState>,
    session: Mutex<Option<ChatSession>>,
}

impl PeerShared {
    /// End the session that owns `connection`
    ///
    /// Returns false if that session was already torn down, in which case
    /// nothing is shown.
    async fn end_session(&self, connection: &Arc<Connection>, reason: &str) -> bool {
        let mut session = self.session.lock().await;
        let current = session
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(&s.connection, connection));
        if !current {
            return false;
        }

        self.observer.display_line(reason);
        *session = None;
        self.release(connection).await;
        true
    }

    /// Close the socket and report the disconnect; callers hold the session lock
    async fn release(&self, connection: &Connection) {
        connection.close().await;
        self.state.send_replace(PeerState::Disconnected);
        self.observer.display_line(status::DISCONNECTED);
        self.observer.on_connected_state_changed(false);
    }
}

/// Client side of a chat
pub struct ChatPeer {
    shared: Arc<PeerShared>,
}

impl ChatPeer {
    pub fn new(observer: SharedObserver) -> Self {
        let (state, _) = watch::channel(PeerState::Disconnected);
        Self {
            shared: Arc::new(PeerShared {
                observer,
                state,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> PeerState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PeerState::Connected
    }

    /// Connect and introduce ourselves as `username`
    ///
    /// The username is the first line sent and is not checked here. A
    /// failed attempt, including a name the wire format cannot carry, is
    /// shown as "Connection refused." and leaves the peer disconnected.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        username: &str,
        buffer_size: usize,
    ) -> Result<()> {
        let mut session = self.shared.session.lock().await;
        if session.is_some() {
            return Err(ParleyError::AlreadyConnected);
        }

        let observer = &self.shared.observer;
        self.shared.state.send_replace(PeerState::Connecting);
        observer.display_line(status::CONNECTING);

        let connection = match Connection::connect((host, port), buffer_size).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                warn!("Failed to connect to {}:{}: {}", host, port, e);
                self.shared.state.send_replace(PeerState::Disconnected);
                observer.display_line(status::CONNECTION_REFUSED);
                return Err(ParleyError::connection(format!(
                    "Failed to connect to {}:{}: {}",
                    host, port, e
                )));
            }
        };

        if let Err(e) = connection.write_line(username).await {
            warn!("Handshake with {}:{} failed: {}", host, port, e);
            connection.close().await;
            self.shared.state.send_replace(PeerState::Disconnected);
            observer.display_line(status::CONNECTION_REFUSED);
            return Err(connection_error(e));
        }

        info!("Connected to {}:{} as {}", host, port, username);
        self.shared.state.send_replace(PeerState::Connected);
        observer.display_line(status::CONNECTED);
        observer.display_line(status::EXIT_HINT);
        observer.on_connected_state_changed(true);

        // The receive task cannot end the session before it is stored
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            Arc::clone(&connection),
        ));
        *session = Some(ChatSession {
            connection,
            receiver,
        });

        Ok(())
    }

    /// Send a line to the server
    ///
    /// `"exit"` leaves the chat and tears the connection down without
    /// waiting for the server. Anything else is echoed locally as
    /// `"You: <text>"`.
    pub async fn send(&self, text: &str) -> Result<()> {
        let mut session = self.shared.session.lock().await;
        let Some(current) = session.as_ref() else {
            return Err(ParleyError::NotConnected);
        };
        let connection = Arc::clone(&current.connection);
        let written = connection.write_line(text).await;

        if text == EXIT {
            if let Err(e) = written {
                debug!("Leave notice not delivered: {}", e);
            }
            info!("Leaving chat");
            *session = None;
            self.shared.release(&connection).await;
            return Ok(());
        }

        written.map_err(connection_error)?;
        self.shared.observer.display_line(&status::own_line(text));
        Ok(())
    }

    /// Leave the chat
    pub async fn disconnect(&self) -> Result<()> {
        self.send(EXIT).await
    }

    /// Wait until the peer is disconnected
    pub async fn wait_disconnected(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == PeerState::Disconnected).await;
    }
}

impl Drop for ChatPeer {
    fn drop(&mut self) {
        if let Ok(mut session) = self.shared.session.try_lock() {
            if let Some(session) = session.take() {
                session.receiver.abort();
            }
        }
    }
}

impl std::fmt::Debug for ChatPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatPeer")
            .field("state", &self.state())
            .finish()
    }
}

fn connection_error(e: ConnectionError) -> ParleyError {
    match e {
        ConnectionError::Closed => ParleyError::ConnectionClosed,
        ConnectionError::Codec(e) => ParleyError::protocol(e.to_string()),
    }
}

async fn receive_loop(shared: Arc<PeerShared>, connection: Arc<Connection>) {
    loop {
        match connection.read_line().await {
            Ok(Some(line)) => match ServerLine::classify(line) {
                ServerLine::Shutdown => {
                    info!("Server is shutting down");
                    if let Err(e) = connection.write_line(EXIT).await {
                        debug!("Shutdown acknowledgement not delivered: {}", e);
                    }
                    shared.end_session(&connection, status::SERVER_CLOSED).await;
                    return;
                }
                ServerLine::Empty => continue,
                ServerLine::Display(text) => shared.observer.display_line(&text),
            },
            Ok(None) => {
                debug!("Server closed the stream");
                break;
            }
            Err(e) if e.is_closed() => {
                debug!("Receive loop stopped after local close");
                return;
            }
            Err(e) => {
                warn!("Connection to server failed: {}", e);
                break;
            }
        }
    }

    shared.end_session(&connection, status::SERVER_LOST).await;
}
