//! The duplex pump: one receive path and one send path over a shared
//! transport, both governed by one `running` flag.
//!
//! The flag only ever goes from `true` to `false`. Whichever path clears
//! it first reports why; the other exits quietly.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tlschat_crypto::{CryptoError, HistoryLog};
use tracing::{debug, error, info, warn};

use crate::role::Role;
use crate::transport::{Received, Transport};

/// Largest chunk the receive path reads at once.
pub const RECV_BUFFER_SIZE: usize = 1023;

/// Line that ends the session instead of being sent.
pub const EXIT_COMMAND: &str = "exit";

const RED: &str = "\x1b[0;31m";
const RESET: &str = "\x1b[0m";

/// `true` for `"exit"` and `"exit\n"`, nothing else.
pub fn is_exit_command(line: &str) -> bool {
    line.strip_suffix('\n').unwrap_or(line) == EXIT_COMMAND
}

/// Where both paths record the messages they handle.
pub trait ChatLog: Sync {
    fn append(&self, label: &str, message: &str) -> Result<(), CryptoError>;
}

impl ChatLog for HistoryLog {
    fn append(&self, label: &str, message: &str) -> Result<(), CryptoError> {
        self.record(label, message)
    }
}

/// Why a path stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathExit {
    /// Operator input reached end-of-file.
    EndOfInput,
    /// Operator typed the exit command.
    ExitRequested,
    /// The peer closed the channel.
    PeerClosed,
    TransportFailed,
    /// The other path stopped the session first.
    Stopped,
    Panicked,
    /// The path's thread was never started.
    NotStarted,
}

impl fmt::Display for PathExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndOfInput => "end of input",
            Self::ExitRequested => "exit requested",
            Self::PeerClosed => "closed by peer",
            Self::TransportFailed => "transport failure",
            Self::Stopped => "stopped",
            Self::Panicked => "panicked",
            Self::NotStarted => "not started",
        };
        f.write_str(text)
    }
}

/// State shared by both paths of one session.
pub(crate) struct Pump<'a, T: Transport> {
    pub transport: &'a T,
    pub running: &'a AtomicBool,
    pub log: &'a dyn ChatLog,
    pub role: Role,
}

impl<T: Transport> Pump<'_, T> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the flag. Returns `true` if this call is the one that did.
    fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    fn record(&self, label: &str, message: &str) {
        if let Err(e) = self.log.append(label, message) {
            warn!(error = %e, label, "Failed to write history record");
        }
    }

    /// Transport -> operator output + history, until the channel closes
    /// or the session stops.
    pub fn receive_path<W: Write>(&self, mut output: W, color: bool) -> PathExit {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        while self.is_running() {
            match self.transport.recv(&mut buf) {
                Ok(Received::Data(n)) => {
                    let text = String::from_utf8_lossy(&buf[..n]);
                    if let Err(e) = show(&mut output, &text, color) {
                        warn!(error = %e, "Failed to display message");
                    }
                    self.record(self.role.peer_label(), &text);
                }
                Ok(Received::Closed) => {
                    if !self.stop() {
                        return PathExit::Stopped;
                    }
                    info!("Connection closed by peer");
                    notice(&mut output, "Connection closed by peer.");
                    return PathExit::PeerClosed;
                }
                Err(e) => {
                    if !self.stop() {
                        debug!(error = %e, "Receive ended during shutdown");
                        return PathExit::Stopped;
                    }
                    error!(error = %e, "Receive failed");
                    notice(&mut output, &format!("Receive failed: {e}"));
                    return PathExit::TransportFailed;
                }
            }
        }
        PathExit::Stopped
    }

    /// Operator input -> transport + history, until end of input, the
    /// exit command, a send failure, or the session stops.
    ///
    /// Input is consumed in chunks of at most `RECV_BUFFER_SIZE` bytes, so a
    /// longer line goes out (and is recorded) as several messages.
    pub fn send_path<R: BufRead>(&self, mut input: R) -> PathExit {
        let mut chunk = Vec::with_capacity(RECV_BUFFER_SIZE);
        while self.is_running() {
            chunk.clear();
            let limit = RECV_BUFFER_SIZE as u64;
            match input.by_ref().take(limit).read_until(b'\n', &mut chunk) {
                Ok(0) => {
                    self.stop();
                    debug!("End of input");
                    return PathExit::EndOfInput;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.stop();
                    warn!(error = %e, "Failed to read input");
                    return PathExit::EndOfInput;
                }
            }

            if !self.is_running() {
                debug!("Discarding line typed after the session stopped");
                return PathExit::Stopped;
            }
            let text = String::from_utf8_lossy(&chunk);
            if is_exit_command(&text) {
                self.stop();
                info!("Exit requested");
                return PathExit::ExitRequested;
            }

            if let Err(e) = self.transport.send(&chunk) {
                if self.stop() {
                    error!(error = %e, "Send failed");
                }
                return PathExit::TransportFailed;
            }
            self.record(self.role.label(), &text);
        }
        PathExit::Stopped
    }
}

fn show<W: Write>(output: &mut W, text: &str, color: bool) -> io::Result<()> {
    if color {
        write!(output, "{RED}{text}{RESET}")?;
    } else {
        output.write_all(text.as_bytes())?;
    }
    output.flush()
}

fn notice<W: Write>(output: &mut W, text: &str) {
    if let Err(e) = writeln!(output, "{text}").and_then(|()| output.flush()) {
        debug!(error = %e, "Failed to write notice");
    }
}
