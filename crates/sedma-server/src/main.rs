//! Sedma server entry point: loads configuration, binds the listener, and
//! spawns the three long-lived tasks — coordinator, accept loop, and
//! operator console — joining them on shutdown.
//!
//! # Exit codes
//!
//! | Code | Meaning                                   |
//! |------|--------------------------------------------|
//! | `0`  | Clean shutdown (operator `quit` or signal) |
//! | `1`  | Could not bind the listening socket        |
//! | `2`  | Invalid CLI arguments or config file        |

mod cli;
mod config;
mod operator;
mod transport;

use std::path::Path;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::from_file(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("sedma-server: {e}");
                std::process::exit(2);
            }
        },
        None => Config::default(),
    };
    config.apply_cli(&args);

    let bind_addr = format!("{}:{}", config.ip, config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("sedma-server: could not bind {bind_addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %bind_addr, max_clients = config.max_clients, max_rooms = config.max_rooms, "listening");

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<transport::Command>();
    let coordinator_task = tokio::spawn(transport::run_coordinator(
        cmd_rx,
        config.max_clients as usize,
        config.max_rooms as usize,
    ));

    let accept_tx = cmd_tx.clone();
    let accept_task = tokio::spawn(transport::run_accept_loop(listener, accept_tx));

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let operator_task = tokio::spawn(operator::run(shutdown_tx.clone()));

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("failed to install signal handler: {e}");
            }
            tracing::info!("received interrupt, shutting down");
        }
    }

    accept_task.abort();
    operator_task.abort();
    let _ = cmd_tx.send(transport::Command::Shutdown);
    drop(cmd_tx);
    let _ = coordinator_task.await;
}
