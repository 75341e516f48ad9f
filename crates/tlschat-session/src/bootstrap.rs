//! Session bootstrap for both roles.
//!
//! Each step owns what it acquired, so an early `?` drops everything
//! built so far in reverse order: connection state, socket, then the
//! TLS context with its identity and trust material.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, ServerConfig, ServerConnection};
use tracing::{debug, info};

use crate::error::HandshakeError;
use crate::identity::{PeerIdentity, client_config, server_config};
use crate::transport::TlsChannel;

/// Dial `addr` and complete the client side of a mutually authenticated
/// handshake.
///
/// The certificate is checked against `server_name`, or the host part
/// of `addr` when none is given.
pub fn establish_as_initiator(
    addr: &str,
    server_name: Option<&str>,
    identity: &PeerIdentity,
    ca_bundle: &Path,
) -> Result<TlsChannel, HandshakeError> {
    let config = client_config(identity, ca_bundle)?;

    let name = server_name.map_or_else(|| host_of(addr).to_owned(), str::to_owned);
    let server_name = ServerName::try_from(name.clone())
        .map_err(|e| HandshakeError::TlsConfig(format!("Invalid server name {name}: {e}")))?;

    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| HandshakeError::Resolve {
            addr: addr.to_owned(),
            reason: e.to_string(),
        })?
        .collect();
    if candidates.is_empty() {
        return Err(HandshakeError::Resolve {
            addr: addr.to_owned(),
            reason: "no addresses".into(),
        });
    }

    let socket = connect_any(addr, &candidates)?;
    let conn = ClientConnection::new(config, server_name)
        .map_err(|e| HandshakeError::TlsConfig(e.to_string()))?;
    TlsChannel::handshake(conn, socket)
}

fn connect_any(addr: &str, candidates: &[SocketAddr]) -> Result<TcpStream, HandshakeError> {
    let mut last_error = None;
    for candidate in candidates {
        match TcpStream::connect(candidate) {
            Ok(socket) => {
                info!(peer = %candidate, "Connected");
                return Ok(socket);
            }
            Err(e) => {
                debug!(peer = %candidate, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(HandshakeError::Connect {
        addr: addr.to_owned(),
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")),
    })
}

/// Host part of `host:port`, without IPv6 brackets.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

/// A bound responder waiting for its single peer.
pub struct PendingResponder {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

/// Load identity and trust material, then bind and listen on `addr`.
pub fn bind_responder(
    addr: &str,
    identity: &PeerIdentity,
    ca_bundle: &Path,
) -> Result<PendingResponder, HandshakeError> {
    let config = server_config(identity, ca_bundle)?;
    let listener = TcpListener::bind(addr).map_err(|e| HandshakeError::Bind {
        addr: addr.to_owned(),
        source: e,
    })?;
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "Waiting for a peer");
    }
    Ok(PendingResponder { listener, config })
}

impl PendingResponder {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept exactly one connection and complete the server side of the
    /// handshake, requiring a client certificate.
    ///
    /// The listener is closed as soon as the connection is accepted, so
    /// later connection attempts are refused.
    pub fn accept(self) -> Result<TlsChannel, HandshakeError> {
        let Self { listener, config } = self;
        let (socket, peer) = listener.accept().map_err(HandshakeError::Accept)?;
        drop(listener);
        info!(%peer, "Accepted connection");

        let conn =
            ServerConnection::new(config).map_err(|e| HandshakeError::TlsConfig(e.to_string()))?;
        TlsChannel::handshake(conn, socket)
    }
}

/// Bind, accept one peer, and complete the handshake.
pub fn establish_as_responder(
    addr: &str,
    identity: &PeerIdentity,
    ca_bundle: &Path,
) -> Result<TlsChannel, HandshakeError> {
    bind_responder(addr, identity, ca_bundle)?.accept()
}
