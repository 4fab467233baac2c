//! parley client: one participant in a broadcast chat

pub mod cli;
pub mod config;
pub mod connection;

pub use config::{AppConfig, ClientConfig, ConfigLoader};
pub use connection::{ChatPeer, PeerState};
