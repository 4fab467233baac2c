//! Command-line argument parsing for the parley client
//!
//! Uses clap for argument parsing with derive macros.

use clap::Parser;
use std::path::PathBuf;

use parley_utils::LogConfig;

use crate::config::AppConfig;

/// parley - terminal chat client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server host name or address
    #[arg(long, env = "PARLEY_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', env = "PARLEY_PORT")]
    pub port: Option<u16>,

    /// Name shown to other participants
    #[arg(long, short = 'u', env = "PARLEY_USERNAME")]
    pub username: Option<String>,

    /// Initial read buffer size in characters (1-1024)
    #[arg(long, env = "PARLEY_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Configuration file
    ///
    /// Defaults to config.toml in the user configuration directory.
    #[arg(long, short = 'c', env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to stderr
    #[arg(long)]
    pub log_stderr: bool,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging setup for this binary
    pub fn log_config(&self, base: LogConfig) -> LogConfig {
        if self.log_stderr {
            base.with_stderr()
        } else {
            base
        }
    }

    /// Override file values with whatever was given on the command line
    pub fn apply(&self, config: &mut AppConfig) {
        let client = &mut config.client;
        if let Some(host) = &self.host {
            client.host = host.clone();
        }
        if let Some(port) = self.port {
            client.port = port;
        }
        if let Some(username) = &self.username {
            client.username = Some(username.clone());
        }
        if let Some(buffer_size) = self.buffer_size {
            client.buffer_size = buffer_size;
        }
    }
}
