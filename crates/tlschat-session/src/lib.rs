//! `tlschat` session lifecycle
//!
//! A session is one mutually authenticated TLS connection between two
//! peers, driven by two long-lived threads:
//!
//! - **receive path**: transport -> operator output + history log
//! - **send path**: operator input -> transport + history log
//!
//! Both paths watch one shared `running` flag. Shutdown never cancels a
//! blocked thread: once the send path has stopped, the coordinator
//! half-closes the socket's read side, which wakes the receive path with
//! EOF. Only after both threads are joined is `close_notify` sent and
//! the connection, socket and TLS context released, in that order.

pub mod bootstrap;
pub mod error;
pub mod identity;
pub mod pump;
pub mod role;
pub mod session;
pub mod shutdown;
pub mod transport;

#[cfg(test)]
mod testing;

pub use bootstrap::{
    PendingResponder, bind_responder, establish_as_initiator, establish_as_responder,
};
pub use error::{HandshakeError, TransportError};
pub use identity::PeerIdentity;
pub use pump::{ChatLog, EXIT_COMMAND, PathExit, RECV_BUFFER_SIZE, is_exit_command};
pub use role::Role;
pub use session::Session;
pub use shutdown::{ShutdownPhase, ShutdownReport, run_session};
pub use transport::{Received, TlsChannel, Transport};
