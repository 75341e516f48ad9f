//! The transport handle: an established, authenticated, encrypted channel.
//!
//! [`TlsChannel`] drives one rustls connection from two threads at once.
//! The receive path blocks on the raw socket WITHOUT holding the
//! connection lock and only locks to feed the bytes it read, so the send
//! path is never stuck behind a pending read.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard};

use rustls::Connection;
use tracing::{debug, info};

use crate::error::{HandshakeError, TransportError};

/// Bytes pulled off the socket per read. Kept well below the TLS
/// plaintext buffer limit so one read can never overflow it.
const SOCKET_READ_SIZE: usize = 4096;

/// Outcome of a successful receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many plaintext bytes were written to the buffer.
    Data(usize),
    /// The peer closed the channel, or our read side was shut down.
    Closed,
}

/// Blocking duplex channel shared by the send and receive paths.
pub trait Transport: Send + Sync {
    /// Transmit all of `data`.
    fn send(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Block until plaintext is available or the channel closes.
    fn recv(&self, buf: &mut [u8]) -> Result<Received, TransportError>;

    /// Half-close the read direction so a blocked [`recv`](Self::recv)
    /// returns promptly.
    fn shutdown_read(&self) -> io::Result<()>;

    /// Protocol-level graceful close (`close_notify`).
    fn close(&self) -> Result<(), TransportError>;
}

/// rustls connection over a blocking TCP socket.
///
/// Field order is drop order: TLS state first, then the socket.
pub struct TlsChannel {
    conn: Mutex<Connection>,
    socket: TcpStream,
    peer: SocketAddr,
}

impl TlsChannel {
    /// Run the handshake to completion on `socket`.
    ///
    /// On failure the connection and socket are dropped before returning.
    pub(crate) fn handshake(
        conn: impl Into<Connection>,
        mut socket: TcpStream,
    ) -> Result<Self, HandshakeError> {
        let mut conn = conn.into();
        let peer = socket
            .peer_addr()
            .map_err(|e| HandshakeError::Handshake(format!("Peer went away: {e}")))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut socket)
                .map_err(|e| HandshakeError::Handshake(e.to_string()))?;
        }
        flush(&mut conn, &socket).map_err(|e| HandshakeError::Handshake(e.to_string()))?;

        info!(
            %peer,
            version = ?conn.protocol_version(),
            suite = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS session established"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            socket,
            peer,
        })
    }

    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TransportError> {
        self.conn.lock().map_err(|_| TransportError::Poisoned)
    }

    /// Feed raw socket bytes into the TLS state machine.
    fn absorb(&self, mut raw: &[u8]) -> Result<(), TransportError> {
        let mut conn = self.lock()?;
        while !raw.is_empty() {
            conn.read_tls(&mut raw)?;
            if let Err(e) = conn.process_new_packets() {
                // Let the alert reach the peer before giving up.
                if let Err(flush_err) = flush(&mut conn, &self.socket) {
                    debug!(error = %flush_err, "Failed to send TLS alert");
                }
                return Err(e.into());
            }
        }
        // Key updates and similar may need a reply.
        flush(&mut conn, &self.socket)?;
        Ok(())
    }
}

fn flush(conn: &mut Connection, mut socket: &TcpStream) -> io::Result<()> {
    while conn.wants_write() {
        conn.write_tls(&mut socket)?;
    }
    Ok(())
}

impl Transport for TlsChannel {
    fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut conn = self.lock()?;
        conn.writer().write_all(data)?;
        flush(&mut conn, &self.socket)?;
        Ok(data.len())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<Received, TransportError> {
        let mut raw = [0u8; SOCKET_READ_SIZE];
        loop {
            {
                let mut conn = self.lock()?;
                match conn.reader().read(buf) {
                    Ok(0) => return Ok(Received::Closed),
                    Ok(n) => return Ok(Received::Data(n)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        debug!(peer = %self.peer, "Peer closed without close_notify");
                        return Ok(Received::Closed);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let n = (&self.socket).read(&mut raw)?;
            if n == 0 {
                return Ok(Received::Closed);
            }
            self.absorb(&raw[..n])?;
        }
    }

    fn shutdown_read(&self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Read)
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut conn = self.lock()?;
        conn.send_close_notify();
        flush(&mut conn, &self.socket)?;
        debug!(peer = %self.peer, "Sent close_notify");
        Ok(())
    }
}
