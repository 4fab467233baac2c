//! parley server: broadcasts chat lines between connected peers

pub mod cli;
pub mod config;
pub mod registry;
pub mod server;
mod tcp;

pub use config::{AppConfig, ConfigLoader, ServerConfig};
pub use registry::{ClientId, PeerEntry, PeerRegistry};
pub use server::{BroadcastServer, ServerState};
