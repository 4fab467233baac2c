//! parley client
//!
//! Prints chat traffic to stdout and sends each stdin line to the server.
//! `exit`, end of input or Ctrl-C leave the chat.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use parley_client::cli::Args;
use parley_client::{ChatPeer, ConfigLoader};
use parley_protocol::CallbackObserver;
use parley_utils::{init_logging_with_config, LogConfig, ParleyError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // stdout carries chat text, so logs go to a file
    init_logging_with_config(args.log_config(LogConfig::client()))?;
    info!("parley client starting");
    tracing::debug!("CLI args: {:?}", args);

    match run(args).await {
        Ok(()) => {
            info!("parley client exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("parley client error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ConfigLoader::load(args.config.as_deref())?;
    args.apply(&mut config);
    let config = config.client;
    ConfigLoader::validate(&config)?;
    let username = config
        .username
        .as_deref()
        .ok_or_else(|| ParleyError::config("a username is required"))?;

    let observer = CallbackObserver::new(|line: &str| println!("{}", line));
    let peer = ChatPeer::new(Arc::new(observer));
    peer.connect(&config.host, config.port, username, config.buffer_size)
        .await?;

    let mut input = spawn_stdin_reader();

    loop {
        tokio::select! {
            line = input.recv() => match line {
                Some(line) => {
                    if let Err(e) = peer.send(&line).await {
                        warn!("Send failed: {}", e);
                        if matches!(e, ParleyError::NotConnected) {
                            break;
                        }
                    }
                }
                None => {
                    info!("stdin closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = peer.wait_disconnected() => break,
        }
    }

    if peer.is_connected() {
        peer.disconnect().await?;
    }
    Ok(())
}

/// Read stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line.trim_end_matches('\r').to_string()).is_err() {
                break;
            }
        }
    });
    rx
}
