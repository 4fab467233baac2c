//! Client-side configuration loading
//!
//! Reads the `[client]` table of the shared `config.toml`. A missing file
//! means defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use parley_protocol::DEFAULT_BUFFER_SIZE;
use parley_utils::{config_file, ParleyError, Result};

/// Default server port
pub const DEFAULT_PORT: u16 = 8000;

/// Largest accepted read buffer, in characters
pub const MAX_BUFFER_SIZE: usize = 1024;

/// Root of the shared config file; other tables are ignored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Initial read buffer size in characters
    pub buffer_size: usize,
    /// Name announced to the chat
    pub username: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            username: None,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `path`, or from the default location if it exists
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let path = config_file();
                if path.exists() {
                    Self::load_from_path(&path)
                } else {
                    tracing::debug!("Config file not found, using defaults");
                    Ok(AppConfig::default())
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| ParleyError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ParleyError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Check the settings needed to connect
    pub fn validate(config: &ClientConfig) -> Result<()> {
        if config.host.trim().is_empty() {
            return Err(ParleyError::config("host must not be empty"));
        }
        if config.port == 0 {
            return Err(ParleyError::config("port must be between 1 and 65535"));
        }
        if config.buffer_size == 0 || config.buffer_size > MAX_BUFFER_SIZE {
            return Err(ParleyError::config(format!(
                "buffer_size must be between 1 and {}",
                MAX_BUFFER_SIZE
            )));
        }
        match config.username.as_deref() {
            None => Err(ParleyError::config(
                "a username is required (--username or [client] username)",
            )),
            Some(name) if name.is_empty() || name.contains(['\n', '\r']) => Err(
                ParleyError::config("username must be non-empty and fit on one line"),
            ),
            Some(_) => Ok(()),
        }
    }
}
