//! Which end of the connection this process is.

use std::fmt;

/// Session role. The initiator dials, the responder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Tag written into history records produced by this role.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initiator => "Client",
            Self::Responder => "Server",
        }
    }

    pub const fn peer(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }

    /// Tag used when logging what the other side sent.
    pub const fn peer_label(self) -> &'static str {
        self.peer().label()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Responder => f.write_str("responder"),
        }
    }
}
