//! Error types for parley
//!
//! Provides a unified error type used across all parley crates.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Main error type for parley operations
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Listener Errors ===

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Server is already listening on {0}")]
    AlreadyListening(SocketAddr),

    #[error("Server is not listening")]
    NotListening,

    #[error("Server is draining, no further messages are accepted")]
    Draining,

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    // === Registry Errors ===

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Peer already registered: {0}")]
    PeerExists(String),

    #[error("Registry is closed to new peers")]
    RegistrySealed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// A failed bind leaves the server idle and a refused connection leaves
    /// the client disconnected, so both can simply be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Connection(_))
    }
}

/// Result type alias using ParleyError
pub type Result<T> = std::result::Result<T, ParleyError>;
