//! Default configuration values
//!
//! Embedded for reference and documentation; a missing config file means
//! exactly these values.

/// Default configuration as TOML
pub const DEFAULT_CONFIG_TOML: &str = r##"
# parley configuration

[server]
bind_address = "0.0.0.0"
port = 8000
# Initial read buffer size per client in characters (1-1024).
# Longer lines are still accepted.
buffer_size = 1024

[client]
host = "127.0.0.1"
port = 8000
buffer_size = 1024
# username = "alice"
"##;
