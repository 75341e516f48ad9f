//! Session error types.

use std::io;

/// Failures while setting up a session. Fatal to the attempt: every
/// resource acquired so far has been released by the time one is returned.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Identity material error: {0}")]
    Identity(String),

    #[error("Trust material error: {0}")]
    Trust(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),
}

/// Failures on an established transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Transport state poisoned by a panicked path")]
    Poisoned,
}
