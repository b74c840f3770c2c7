//! Operator console: reading `quit`/`exit`/`q` or EOF on stdin asks the
//! server to shut down.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Reads lines from stdin until one matches a shutdown command or the
/// stream hits EOF, then sends once on `shutdown` and returns.
pub async fn run(shutdown: mpsc::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let cmd = line.trim();
                if cmd == "quit" || cmd == "exit" || cmd == "q" {
                    tracing::info!("operator requested shutdown");
                    let _ = shutdown.send(()).await;
                    return;
                }
            }
            Ok(None) => {
                tracing::info!("operator console reached EOF, shutting down");
                let _ = shutdown.send(()).await;
                return;
            }
            Err(e) => {
                tracing::warn!("operator console read error: {e}");
                return;
            }
        }
    }
}
