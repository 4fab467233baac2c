//! Configuration for the parley server
//!
//! Reads the `[server]` table of the shared `config.toml`. Command-line
//! flags are applied on top by the binary.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;
