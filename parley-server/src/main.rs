//! parley server
//!
//! Prints chat traffic to stdout and broadcasts each stdin line to every
//! client. `exit`, end of input or Ctrl-C shut the server down once all
//! clients have left.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use parley_protocol::{CallbackObserver, EXIT};
use parley_server::cli::Args;
use parley_server::{BroadcastServer, ConfigLoader, ServerState};
use parley_utils::{init_logging_with_config, LogConfig, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // stdout carries chat text, so logs go to a file
    init_logging_with_config(args.log_config(LogConfig::server()))?;
    info!("parley server starting");

    match run(args).await {
        Ok(()) => {
            info!("parley server stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("parley server error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ConfigLoader::load_from(args.config.as_deref())?;
    args.apply(&mut config);
    ConfigLoader::validate(&config)?;

    let observer = CallbackObserver::new(|line: &str| println!("{}", line));
    let server = BroadcastServer::new(Arc::new(observer));
    let addr = server.listen(&config.server).await?;
    info!("Listening on {}", addr);

    let mut input = spawn_stdin_reader();

    loop {
        tokio::select! {
            line = input.recv() => match line {
                Some(line) if line == EXIT => break,
                Some(line) => {
                    if let Err(e) = server.send_to_all(&line).await {
                        warn!("Broadcast failed: {}", e);
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
        }
    }

    if server.state() == ServerState::Listening {
        server.stop_listening().await?;
    }
    server.wait_closed().await;
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
