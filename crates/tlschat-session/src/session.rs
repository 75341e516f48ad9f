//! A live session: role plus an established transport.

use crate::role::Role;
use crate::transport::Transport;

/// One established session.
///
/// Dropping it releases the transport. For [`crate::TlsChannel`] that
/// means TLS state first, then the socket, then (once its last reference
/// goes) the TLS context holding identity and trust material.
pub struct Session<T: Transport> {
    role: Role,
    transport: T,
}

impl<T: Transport> Session<T> {
    pub const fn new(role: Role, transport: T) -> Self {
        Self { role, transport }
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }
}
