//! Configuration loader

use std::path::Path;

use parley_utils::{config_file, ParleyError, Result};

use super::{AppConfig, MAX_BUFFER_SIZE};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| ParleyError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| ParleyError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        let buffer_size = config.server.buffer_size;
        if buffer_size == 0 || buffer_size > MAX_BUFFER_SIZE {
            return Err(ParleyError::config(format!(
                "buffer_size must be between 1 and {}",
                MAX_BUFFER_SIZE
            )));
        }

        Ok(())
    }

    /// Load from `path`, or from the default location when none is given
    ///
    /// Not validated, so command-line overrides can be applied first.
    pub fn load_from(path: Option<&Path>) -> Result<AppConfig> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }
}
