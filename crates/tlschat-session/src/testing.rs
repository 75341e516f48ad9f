//! Deterministic stand-ins for the transport, the history log and the
//! operator console.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io::{self, BufRead, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tlschat_crypto::CryptoError;

use crate::error::TransportError;
use crate::pump::ChatLog;
use crate::transport::{Received, Transport};

/// Observable transport calls, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Sent,
    ShutdownRead,
    Close,
    Released,
}

#[derive(Default)]
struct FakeState {
    inbound: VecDeque<Vec<u8>>,
    peer_closed: bool,
    read_closed: bool,
    fail_sends: bool,
    fail_close: bool,
    sent: Vec<String>,
    events: Vec<Event>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<FakeState>,
    wake: Condvar,
}

/// Transport whose `recv` blocks like a socket until data arrives, the
/// peer closes, or the read side is shut down.
pub struct FakeTransport {
    shared: Arc<Shared>,
}

/// Test-side view of a [`FakeTransport`] that outlives it.
#[derive(Clone)]
pub struct FakeHandle {
    shared: Arc<Shared>,
}

impl FakeTransport {
    pub fn new() -> (Self, FakeHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakeHandle { shared },
        )
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.shared.state.lock().unwrap().events.push(Event::Released);
    }
}

impl FakeHandle {
    fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.shared.state.lock().unwrap());
        self.shared.wake.notify_all();
    }

    pub fn push_inbound(&self, data: &[u8]) {
        self.update(|s| s.inbound.push_back(data.to_vec()));
    }

    pub fn close_from_peer(&self) {
        self.update(|s| s.peer_closed = true);
    }

    pub fn fail_sends(&self) {
        self.update(|s| s.fail_sends = true);
    }

    pub fn fail_close(&self) {
        self.update(|s| s.fail_close = true);
    }

    pub fn sent(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().sent.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.state.lock().unwrap().events.clone()
    }
}

impl Transport for FakeTransport {
    fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.fail_sends {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "fake send failure").into());
        }
        state.sent.push(String::from_utf8_lossy(data).into_owned());
        state.events.push(Event::Sent);
        Ok(data.len())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<Received, TransportError> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.read_closed {
                return Ok(Received::Closed);
            }
            if let Some(chunk) = state.inbound.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                return Ok(Received::Data(n));
            }
            if state.peer_closed {
                return Ok(Received::Closed);
            }
            state = self.shared.wake.wait(state).unwrap();
        }
    }

    fn shutdown_read(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        state.read_closed = true;
        state.events.push(Event::ShutdownRead);
        drop(state);
        self.shared.wake.notify_all();
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock().unwrap();
        state.events.push(Event::Close);
        if state.fail_close {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "fake close failure").into());
        }
        Ok(())
    }
}

/// History sink that keeps `(label, message)` pairs in memory.
#[derive(Default)]
pub struct MemoryLog {
    records: Mutex<Vec<(String, String)>>,
}

impl MemoryLog {
    pub fn records(&self) -> Vec<(String, String)> {
        self.records.lock().unwrap().clone()
    }
}

impl ChatLog for MemoryLog {
    fn append(&self, label: &str, message: &str) -> Result<(), CryptoError> {
        self.records
            .lock()
            .unwrap()
            .push((label.to_owned(), message.to_owned()));
        Ok(())
    }
}

/// History sink whose every write fails.
pub struct FailingLog;

impl ChatLog for FailingLog {
    fn append(&self, _label: &str, _message: &str) -> Result<(), CryptoError> {
        Err(io::Error::other("disk full").into())
    }
}

/// Operator input fed line by line from the test; EOF once the sender
/// is dropped.
pub struct ChannelInput {
    rx: Receiver<String>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelInput {
    pub fn new() -> (Self, Sender<String>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                buf: Vec::new(),
                pos: 0,
            },
            tx,
        )
    }
}

impl Read for ChannelInput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for ChannelInput {
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

/// Cloneable in-memory operator output.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
