//! Shutdown coordinator.
//!
//! `Active -> SendDraining -> ReceiveDraining -> ProtocolClosing -> Released`
//!
//! The receive path is never cancelled. After the send path has been
//! joined, the socket's read side is half-closed so the blocked read
//! returns, and only then is the receive path joined. `close_notify` and
//! resource release follow once neither path can touch the transport.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ScopedJoinHandle};

use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::pump::{ChatLog, PathExit, Pump};
use crate::session::Session;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownPhase {
    Active,
    /// Send path stopped and joined.
    SendDraining,
    /// Read side half-closed, receive path being joined.
    ReceiveDraining,
    ProtocolClosing,
    /// Transport, socket and TLS context dropped.
    Released,
}

/// What happened while a session ran and wound down.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Phases in the order they were entered.
    pub phases: Vec<ShutdownPhase>,
    pub send_exit: PathExit,
    pub receive_exit: PathExit,
    pub half_close_error: Option<io::Error>,
    pub close_error: Option<TransportError>,
}

impl ShutdownReport {
    fn new() -> Self {
        Self {
            phases: vec![ShutdownPhase::Active],
            send_exit: PathExit::NotStarted,
            receive_exit: PathExit::NotStarted,
            half_close_error: None,
            close_error: None,
        }
    }

    fn enter(&mut self, phase: ShutdownPhase) {
        debug!(?phase, "Session shutdown phase");
        self.phases.push(phase);
    }

    pub fn is_released(&self) -> bool {
        self.phases.last() == Some(&ShutdownPhase::Released)
    }

    /// The exit that ended the session: whichever path stopped it.
    pub fn cause(&self) -> PathExit {
        match (self.send_exit, self.receive_exit) {
            (PathExit::Stopped | PathExit::NotStarted, receive) => receive,
            (send, _) => send,
        }
    }
}

/// Run both paths of `session` until either stops, then shut down and
/// release everything in order.
///
/// `input` feeds the send path, `output` receives what the peer sends.
/// Always returns with the session released.
pub fn run_session<T, R, W>(
    session: Session<T>,
    input: R,
    output: W,
    log: &dyn ChatLog,
    color: bool,
) -> ShutdownReport
where
    T: Transport,
    R: BufRead + Send,
    W: Write + Send,
{
    let running = AtomicBool::new(true);
    let mut report = ShutdownReport::new();
    let pump = &Pump {
        transport: session.transport(),
        running: &running,
        log,
        role: session.role(),
    };
    info!(role = %session.role(), "Session started");

    thread::scope(|scope| {
        let receiver = match thread::Builder::new()
            .name("recv".into())
            .spawn_scoped(scope, move || pump.receive_path(output, color))
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Failed to start receive path");
                running.store(false, Ordering::Release);
                return;
            }
        };

        match thread::Builder::new()
            .name("send".into())
            .spawn_scoped(scope, move || pump.send_path(input))
        {
            Ok(sender) => report.send_exit = join_path(sender, &running, "send"),
            Err(e) => {
                error!(error = %e, "Failed to start send path");
                running.store(false, Ordering::Release);
            }
        }
        report.enter(ShutdownPhase::SendDraining);

        if let Err(e) = pump.transport.shutdown_read() {
            warn!(error = %e, "Read half-close failed");
            report.half_close_error = Some(e);
        }
        report.enter(ShutdownPhase::ReceiveDraining);
        report.receive_exit = join_path(receiver, &running, "recv");
    });

    report.enter(ShutdownPhase::ProtocolClosing);
    if let Err(e) = session.transport().close() {
        warn!(error = %e, "Graceful close failed");
        report.close_error = Some(e);
    }

    drop(session);
    report.enter(ShutdownPhase::Released);
    info!(
        send = %report.send_exit,
        receive = %report.receive_exit,
        "Session ended"
    );
    report
}

fn join_path(handle: ScopedJoinHandle<'_, PathExit>, running: &AtomicBool, name: &str) -> PathExit {
    handle.join().unwrap_or_else(|_| {
        error!(path = name, "Session path panicked");
        running.store(false, Ordering::Release);
        PathExit::Panicked
    })
}
