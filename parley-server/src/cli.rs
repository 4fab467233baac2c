//! Command-line argument parsing for the parley server

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

use parley_utils::LogConfig;

use crate::config::AppConfig;

/// parley-server - broadcast chat lines between connected clients
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on
    #[arg(long, short = 'p', env = "PARLEY_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, short = 'b', env = "PARLEY_BIND")]
    pub bind: Option<IpAddr>,

    /// Initial read buffer size per client, in characters (1-1024)
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
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.server.buffer_size = buffer_size;
        }
    }
}
