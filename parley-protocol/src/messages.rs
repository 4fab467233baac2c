//! Chat protocol lines
//!
//! Every line that changes protocol state, and every line the server
//! builds, is defined here.

/// Leave sentinel, sent by a peer to the server
pub const EXIT: &str = "exit";

/// Display name the broadcaster uses for its own messages
pub const SERVER_NAME: &str = "Server";

/// Shutdown sentinel, sent by the server to every peer
pub const SERVER_EXIT: &str = "Server: exit";

/// A chat line as relayed to other peers: `"<sender>: <text>"`
pub fn chat_line(sender: &str, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// A broadcaster-authored line: `"Server: <text>"`
pub fn server_line(text: &str) -> String {
    chat_line(SERVER_NAME, text)
}

pub fn joined(name: &str) -> String {
    format!("{} joined the chat!", name)
}

pub fn left(name: &str) -> String {
    format!("{} left the chat!", name)
}

pub fn disconnected(name: &str) -> String {
    format!("{} disconnected unexpectedly!", name)
}

/// A line read by the server from one of its peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerLine {
    /// The peer is leaving
    Leave,
    /// Nothing to relay
    Empty,
    /// Chat text to broadcast
    Chat(String),
}

impl PeerLine {
    pub fn classify(line: String) -> Self {
        if line == EXIT {
            Self::Leave
        } else if line.is_empty() {
            Self::Empty
        } else {
            Self::Chat(line)
        }
    }
}

/// A line read by a client from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// The server is shutting down and expects an `exit` reply
    Shutdown,
    /// Nothing to display
    Empty,
    /// Text to display verbatim
    Display(String),
}

impl ServerLine {
    pub fn classify(line: String) -> Self {
        if line == SERVER_EXIT {
            Self::Shutdown
        } else if line.is_empty() {
            Self::Empty
        } else {
            Self::Display(line)
        }
    }
}

/// Status lines shown to the local user
pub mod status {
    pub const CONNECTING: &str = "Connecting..";
    pub const CONNECTED: &str = "Connected!";
    pub const EXIT_HINT: &str = "Type `exit` to disconnect.";
    pub const CONNECTION_REFUSED: &str = "Connection refused.";
    pub const DISCONNECTED: &str = "Disconnected.";
    pub const SERVER_CLOSED: &str = "Server has closed the connection.";
    pub const SERVER_LOST: &str = "Server disconnected unexpectedly!";
    pub const DISCONNECTING: &str = "Disconnecting...";
    pub const SERVER_STOPPED: &str = "You have disconnected successfully.";
    pub const ADDRESS_IN_USE: &str =
        "Another server is already running on this IP address and port.";

    /// Echo of a line the local user sent
    pub fn own_line(text: &str) -> String {
        format!("You: {}", text)
    }
}
