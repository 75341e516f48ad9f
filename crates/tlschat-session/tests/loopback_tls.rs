#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Real mutually authenticated sessions over loopback, using throwaway
//! PKI generated per test.

use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tlschat_crypto::HistoryLog;
use tlschat_crypto::certs::{DevPkiPaths, generate_dev_pki, write_dev_pki};
use tlschat_session::{
    HandshakeError, PathExit, PeerIdentity, Role, Session, Transport, bind_responder,
    establish_as_initiator, run_session,
};

const KEY_PASSPHRASE: &str = "123456";

fn pki(dir: &Path) -> DevPkiPaths {
    let pki = generate_dev_pki(&["localhost"], Some(KEY_PASSPHRASE)).unwrap();
    write_dev_pki(dir, &pki).unwrap()
}

fn server_identity(paths: &DevPkiPaths) -> PeerIdentity {
    PeerIdentity::new(&paths.server_cert, &paths.server_key, KEY_PASSPHRASE)
}

fn client_identity(paths: &DevPkiPaths) -> PeerIdentity {
    PeerIdentity::new(&paths.client_cert, &paths.client_key, KEY_PASSPHRASE)
}

struct LineInput {
    rx: Receiver<String>,
    buf: Vec<u8>,
    pos: usize,
}

fn line_input() -> (LineInput, Sender<String>) {
    let (tx, rx) = mpsc::channel();
    (
        LineInput {
            rx,
            buf: Vec::new(),
            pos: 0,
        },
        tx,
    )
}

impl Read for LineInput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for LineInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(line) => {
                    self.buf = line.into_bytes();
                    self.pos = 0;
                }
                Err(_) => return Ok(&[]),
            }
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt;
    }
}

#[derive(Clone, Default)]
struct Screen(Arc<Mutex<Vec<u8>>>);

impl Screen {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    fn wait_for(&self, needle: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.text().contains(needle) {
            assert!(Instant::now() < deadline, "timed out waiting for {needle:?}");
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Write for Screen {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn messages_flow_both_ways_and_are_logged_on_each_side() {
    let dir = tempfile::tempdir().unwrap();
    let paths = pki(&dir.path().join("certs"));
    let server_log = HistoryLog::open(dir.path().join("server.txt"), "pw");
    let client_log = HistoryLog::open(dir.path().join("client.txt"), "pw");

    let pending = bind_responder("127.0.0.1:0", &server_identity(&paths), &paths.ca_cert).unwrap();
    let addr = pending.local_addr().unwrap().to_string();

    let (server_in, server_tx) = line_input();
    let (client_in, client_tx) = line_input();
    let server_screen = Screen::default();
    let client_screen = Screen::default();

    let (server_report, client_report) = thread::scope(|scope| {
        let server = scope.spawn(|| {
            let channel = pending.accept().unwrap();
            run_session(
                Session::new(Role::Responder, channel),
                server_in,
                server_screen.clone(),
                &server_log,
                false,
            )
        });

        let channel = establish_as_initiator(
            &addr,
            Some("localhost"),
            &client_identity(&paths),
            &paths.ca_cert,
        )
        .unwrap();
        let client = scope.spawn(|| {
            run_session(
                Session::new(Role::Initiator, channel),
                client_in,
                client_screen.clone(),
                &client_log,
                false,
            )
        });

        client_tx.send("hello\n".into()).unwrap();
        server_screen.wait_for("hello\n");
        server_tx.send("hi back\n".into()).unwrap();
        client_screen.wait_for("hi back\n");

        client_tx.send("exit\n".into()).unwrap();
        server_screen.wait_for("Connection closed by peer.");
        drop(server_tx);

        (server.join().unwrap(), client.join().unwrap())
    });

    assert_eq!(client_report.send_exit, PathExit::ExitRequested);
    assert!(client_report.is_released());
    assert_eq!(server_report.receive_exit, PathExit::PeerClosed);
    assert!(server_report.is_released());
    assert!(!server_screen.text().contains("exit"));

    for log in [&server_log, &client_log] {
        let records: Vec<String> = log.read().unwrap().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2, "{records:?}");
        assert!(records[0].ends_with("] Client: hello\n"));
        assert!(records[1].ends_with("] Server: hi back\n"));
    }
}

#[test]
fn initiator_rejects_server_from_another_ca() {
    let dir = tempfile::tempdir().unwrap();
    let ours = pki(&dir.path().join("ours"));
    let theirs = pki(&dir.path().join("theirs"));

    let pending = bind_responder("127.0.0.1:0", &server_identity(&theirs), &theirs.ca_cert).unwrap();
    let addr = pending.local_addr().unwrap().to_string();

    thread::scope(|scope| {
        let server = scope.spawn(|| pending.accept());
        let client =
            establish_as_initiator(&addr, Some("localhost"), &client_identity(&ours), &ours.ca_cert);

        assert!(matches!(client, Err(HandshakeError::Handshake(_))));
        drop(client);
        assert!(server.join().unwrap().is_err());
    });
}

#[test]
fn responder_rejects_client_certificate_from_another_ca() {
    let dir = tempfile::tempdir().unwrap();
    let ours = pki(&dir.path().join("ours"));
    let stranger = pki(&dir.path().join("stranger"));

    let pending = bind_responder("127.0.0.1:0", &server_identity(&ours), &ours.ca_cert).unwrap();
    let addr = pending.local_addr().unwrap().to_string();

    thread::scope(|scope| {
        let server = scope.spawn(|| pending.accept());
        // Trusts the right CA but presents a certificate the responder
        // cannot chain.
        let client = establish_as_initiator(
            &addr,
            Some("localhost"),
            &client_identity(&stranger),
            &ours.ca_cert,
        );

        let server = server.join().unwrap();
        assert!(matches!(server, Err(HandshakeError::Handshake(_))));
        drop(client);
    });
}

#[test]
fn second_initiator_is_refused_after_the_first_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let paths = pki(dir.path());

    let pending = bind_responder("127.0.0.1:0", &server_identity(&paths), &paths.ca_cert).unwrap();
    let addr = pending.local_addr().unwrap();

    thread::scope(|scope| {
        let server = scope.spawn(|| pending.accept());
        let first = establish_as_initiator(
            &addr.to_string(),
            Some("localhost"),
            &client_identity(&paths),
            &paths.ca_cert,
        )
        .unwrap();
        let server = server.join().unwrap().unwrap();

        let second = TcpStream::connect(addr);
        assert!(second.is_err(), "second connection was accepted");

        first.close().unwrap();
        drop(first);
        drop(server);
    });
}

#[test]
fn wrong_key_passphrase_fails_before_listening() {
    let dir = tempfile::tempdir().unwrap();
    let paths = pki(dir.path());
    let identity = PeerIdentity::new(&paths.server_cert, &paths.server_key, "wrong");

    let result = bind_responder("127.0.0.1:0", &identity, &paths.ca_cert);
    assert!(matches!(result, Err(HandshakeError::Identity(_))));
}
