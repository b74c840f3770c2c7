//! The transport boundary.
//!
//! The coordinator only ever talks to a client through this trait — it never
//! touches a socket, a framer, or a task handle directly. Production code
//! backs it with a channel into a per-connection writer task; tests back it
//! with a plain recorder. This replaces the original callback-table design
//! (a struct of function pointers invoked with an opaque handle) with an
//! object the compiler can check.

use crate::error::ErrorCode;

/// One client's outbound half. Every method is fire-and-forget from the
/// coordinator's point of view: a client that's gone dark just silently
/// drops what's sent to it until the transport notices and tells the
/// coordinator to drop the slot.
pub trait Sink: Send {
    /// Sends one already-formatted protocol line (no trailing newline).
    fn send_line(&mut self, line: &str);

    /// Sends an `ERR <cmd> code=<CODE> msg=<token>` line. `msg` is a short
    /// freeform token (e.g. `already_online`, `line_too_long`) distinct from
    /// the fixed `code` — two failures of the same code can carry different
    /// messages.
    fn send_err(&mut self, cmd: &str, code: ErrorCode, msg: &str) {
        self.send_line(&format!("ERR {} code={} msg={}", cmd, code.as_str(), msg));
    }

    /// Tells the transport to close this client's connection.
    fn close(&mut self);
}
