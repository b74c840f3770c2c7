//! Transport/event loop: accepts TCP connections, frames lines out of each
//! client's byte stream, and forwards them to the single coordinator task
//! over a command channel. The coordinator never touches a socket directly
//! — it only sees [`sedma_core::sink::Sink`] objects backed by the writer
//! half spawned here.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use sedma_core::coordinator::Coordinator;
use sedma_core::sink::Sink;

/// Per-client receive buffer cap, matching the protocol's fixed line table.
const MAX_BUF_LEN: usize = 8192;
/// A line's content (excluding the delimiter) longer than this is a framing
/// violation. 1023 bytes is the largest accepted line.
const MAX_LINE_LEN: usize = 1023;

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Extracts `\n`-delimited lines out of an accumulating byte buffer.
/// Embedded `\r` right before the delimiter is stripped; empty lines are
/// dropped rather than surfaced.
struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    fn new() -> LineFramer {
        LineFramer { buf: Vec::new() }
    }

    /// Appends `chunk` and returns every complete line now available.
    /// `Err` carries the framing-violation reason the caller should pass to
    /// [`Coordinator::frame_violation`]; the connection is not recoverable
    /// past that point.
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, &'static str> {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > MAX_BUF_LEN {
            return Err("buffer_overflow");
        }

        let mut lines = Vec::new();
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > MAX_LINE_LEN {
                    return Err("line_too_long");
                }
                break;
            };
            let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
            raw.pop(); // trailing '\n'
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if raw.len() > MAX_LINE_LEN {
                return Err("line_too_long");
            }
            if raw.is_empty() {
                continue;
            }
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }
        Ok(lines)
    }
}

enum WriterMsg {
    Line(String),
    Close,
}

/// [`Sink`] implementation backed by a channel into this connection's
/// writer task.
struct TcpSink {
    tx: mpsc::UnboundedSender<WriterMsg>,
}

impl Sink for TcpSink {
    fn send_line(&mut self, line: &str) {
        let _ = self.tx.send(WriterMsg::Line(line.to_string()));
    }

    fn close(&mut self) {
        let _ = self.tx.send(WriterMsg::Close);
    }
}

/// Commands the coordinator task drains off its single inbox. Every
/// mutation of client/room/game state funnels through here, so the
/// coordinator itself never needs a lock.
pub enum Command {
    Accept { sink: Box<dyn Sink>, reply: oneshot::Sender<Option<usize>> },
    Line { slot: usize, line: String },
    FrameViolation { slot: usize, reason: &'static str },
    Disconnect { slot: usize },
    Shutdown,
}

/// Owns the [`Coordinator`] outright and drains `rx` until the channel
/// closes, driving the periodic tick (idle/offline/pause timers) on the
/// side.
pub async fn run_coordinator(mut rx: mpsc::UnboundedReceiver<Command>, max_clients: usize, max_rooms: usize) {
    let mut coordinator = Coordinator::new(max_clients, max_rooms);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                coordinator.tick(now_secs());
            }
            cmd = rx.recv() => {
                match cmd {
                    None => break,
                    Some(Command::Accept { sink, reply }) => {
                        let slot = coordinator.accept(sink, now_secs());
                        let _ = reply.send(slot);
                    }
                    Some(Command::Line { slot, line }) => {
                        coordinator.handle_line(slot, &line, now_secs());
                    }
                    Some(Command::FrameViolation { slot, reason }) => {
                        coordinator.frame_violation(slot, reason);
                    }
                    Some(Command::Disconnect { slot }) => {
                        coordinator.disconnect(slot);
                    }
                    Some(Command::Shutdown) => {
                        coordinator.shutdown();
                        break;
                    }
                }
            }
        }
    }
}

/// Accepts connections forever, spawning one task per client.
pub async fn run_accept_loop(listener: TcpListener, cmd_tx: mpsc::UnboundedSender<Command>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let tx = cmd_tx.clone();
                tokio::spawn(async move {
                    handle_connection(stream, addr, tx).await;
                });
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, cmd_tx: mpsc::UnboundedSender<Command>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (wtx, mut wrx) = mpsc::unbounded_channel::<WriterMsg>();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = wrx.recv().await {
            match msg {
                WriterMsg::Line(line) => {
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    if write_half.write_all(b"\n").await.is_err() {
                        break;
                    }
                }
                WriterMsg::Close => {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        }
    });

    let sink: Box<dyn Sink> = Box::new(TcpSink { tx: wtx.clone() });
    let (reply_tx, reply_rx) = oneshot::channel();
    if cmd_tx.send(Command::Accept { sink, reply: reply_tx }).is_err() {
        return;
    }

    let slot = match reply_rx.await {
        Ok(Some(slot)) => slot,
        _ => {
            let _ = wtx.send(WriterMsg::Close);
            let _ = writer_task.await;
            return;
        }
    };

    tracing::info!(%addr, slot, "client connected");

    let mut framer = LineFramer::new();
    let mut buf = [0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                let _ = cmd_tx.send(Command::Disconnect { slot });
                break;
            }
            Ok(n) => match framer.feed(&buf[..n]) {
                Ok(lines) => {
                    let mut send_failed = false;
                    for line in lines {
                        if cmd_tx.send(Command::Line { slot, line }).is_err() {
                            send_failed = true;
                            break;
                        }
                    }
                    if send_failed {
                        break;
                    }
                }
                Err(reason) => {
                    let _ = cmd_tx.send(Command::FrameViolation { slot, reason });
                    break;
                }
            },
            Err(_) => {
                let _ = cmd_tx.send(Command::Disconnect { slot });
                break;
            }
        }
    }

    tracing::info!(%addr, slot, "client disconnected");
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_1023_byte_line() {
        let mut framer = LineFramer::new();
        let mut line = vec![b'x'; 1023];
        line.push(b'\n');
        let lines = framer.feed(&line).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 1023);
    }

    #[test]
    fn rejects_1024_byte_line() {
        let mut framer = LineFramer::new();
        let mut line = vec![b'x'; 1024];
        line.push(b'\n');
        assert_eq!(framer.feed(&line), Err("line_too_long"));
    }

    #[test]
    fn strips_trailing_cr_and_skips_blank_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"REQ PING\r\n\nREQ PONG\n").unwrap();
        assert_eq!(lines, vec!["REQ PING".to_string(), "REQ PONG".to_string()]);
    }

    #[test]
    fn feeds_across_multiple_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"REQ LO").unwrap().is_empty());
        let lines = framer.feed(b"GIN nick=a\n").unwrap();
        assert_eq!(lines, vec!["REQ LOGIN nick=a".to_string()]);
    }

    #[test]
    fn oversized_buffer_without_newline_overflows() {
        let mut framer = LineFramer::new();
        let chunk = vec![b'x'; MAX_BUF_LEN + 1];
        assert_eq!(framer.feed(&chunk), Err("buffer_overflow"));
    }
}
