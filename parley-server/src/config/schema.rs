//! Configuration schema structs

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use parley_protocol::DEFAULT_BUFFER_SIZE;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8000;

/// Largest accepted read buffer, in characters
pub const MAX_BUFFER_SIZE: usize = 1024;

/// Root configuration
///
/// Other tables in the shared file (such as `[client]`) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (default: all interfaces)
    pub bind_address: IpAddr,
    /// Port to listen on; 0 picks a free port
    pub port: u16,
    /// Initial read buffer size per peer, in characters
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Listen on `port` on all interfaces with default buffer size
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
