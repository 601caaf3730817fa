//! Serial port transport abstraction.
//!
//! Wraps OS-level serial I/O behind an object-safe async trait so the
//! session controller and reader loop are testable without hardware.
//! `SystemTransport` drives a real port through the `serialport` crate;
//! `SimulatedTransport` is fully in-memory for unit tests and offline use.

use crate::terminal::types::{ConnectionConfig, TerminalError};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Platform-agnostic serial port transport.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and shared between the reader task (reads) and the session
/// controller (writes).
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Open the port with the given configuration. The handle exists only
    /// between a successful `open` and the matching `close`.
    async fn open(&self, config: &ConnectionConfig) -> Result<(), TerminalError>;

    /// Close the port. Idempotent.
    async fn close(&self) -> Result<(), TerminalError>;

    /// Number of bytes waiting in the receive buffer.
    async fn bytes_available(&self) -> Result<usize, TerminalError>;

    /// Read up to `buf.len()` of the currently buffered bytes. Returns the
    /// number of bytes read; `Ok(0)` when nothing is pending. Never blocks
    /// past what is already buffered — callers poll.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TerminalError>;

    /// Write the full byte sequence. Returns the number of bytes written.
    async fn write(&self, buf: &[u8]) -> Result<usize, TerminalError>;

    /// Check whether the port is open.
    fn is_open(&self) -> bool;

    /// Retrieve the port name.
    fn port_name(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  System transport (real hardware)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transport over a real serial device via the `serialport` crate.
pub struct SystemTransport {
    name: String,
    open: AtomicBool,
    port: Mutex<Option<Box<dyn serialport::SerialPort>>>,
}

impl SystemTransport {
    /// Create a transport for the given port name (not yet opened).
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            port: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl SerialTransport for SystemTransport {
    async fn open(&self, config: &ConnectionConfig) -> Result<(), TerminalError> {
        if config.baud_rate == 0 {
            return Err(TerminalError::connection_open(
                "baud rate must be a positive integer",
            ));
        }
        let mut guard = self.port.lock().await;
        if guard.is_some() {
            return Err(TerminalError::connection_open(format!(
                "port {} already open",
                self.name
            )));
        }
        // A short timeout keeps reads from stalling the poll loop; reads
        // are sized by `bytes_to_read` so the timeout rarely fires.
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                TerminalError::connection_open(format!(
                    "failed to open {}: {}",
                    config.port, e
                ))
            })?;
        *guard = Some(port);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TerminalError> {
        self.open.store(false, Ordering::SeqCst);
        self.port.lock().await.take();
        Ok(())
    }

    async fn bytes_available(&self) -> Result<usize, TerminalError> {
        let guard = self.port.lock().await;
        let port = guard
            .as_ref()
            .ok_or_else(|| TerminalError::io("port not open"))?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| TerminalError::io(format!("bytes_to_read failed: {}", e)))
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TerminalError> {
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or_else(|| TerminalError::io("port not open"))?;
        let available = port
            .bytes_to_read()
            .map_err(|e| TerminalError::io(format!("bytes_to_read failed: {}", e)))?
            as usize;
        if available == 0 {
            return Ok(0);
        }
        let want = available.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TerminalError::io(format!("read failed: {}", e))),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TerminalError> {
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or_else(|| TerminalError::connection_write("port not open"))?;
        port.write_all(buf)
            .map_err(|e| TerminalError::connection_write(format!("write failed: {}", e)))?;
        let _ = port.flush();
        Ok(buf.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory transport useful for unit tests.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    rx_buf: Mutex<VecDeque<u8>>,
    tx_buf: Mutex<VecDeque<u8>>,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
}

impl SimulatedTransport {
    /// Create a new simulated transport for the given port name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            tx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            fail_open: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make the next `open` call fail (simulate a missing/busy port).
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make `write` calls fail (simulate a port that went away).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Inject bytes into the receive buffer (simulate incoming data).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
    }

    /// Drain all bytes from the transmit buffer (for test assertions).
    pub async fn drain_tx(&self) -> Vec<u8> {
        let mut buf = self.tx_buf.lock().await;
        buf.drain(..).collect()
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedTransport {
    async fn open(&self, config: &ConnectionConfig) -> Result<(), TerminalError> {
        if config.baud_rate == 0 {
            return Err(TerminalError::connection_open(
                "baud rate must be a positive integer",
            ));
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TerminalError::connection_open(format!(
                "could not open port {}: no such device",
                config.port
            )));
        }
        if self.open.load(Ordering::SeqCst) {
            return Err(TerminalError::connection_open(format!(
                "port {} already open",
                self.name
            )));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TerminalError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn bytes_available(&self) -> Result<usize, TerminalError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TerminalError::io("port not open"));
        }
        let rx = self.rx_buf.lock().await;
        Ok(rx.len())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TerminalError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TerminalError::io("port not open"));
        }
        let mut rx = self.rx_buf.lock().await;
        let count = buf.len().min(rx.len());
        for slot in buf.iter_mut().take(count) {
            if let Some(byte) = rx.pop_front() {
                *slot = byte;
            }
        }
        Ok(count)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TerminalError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TerminalError::connection_write("port not open"));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TerminalError::connection_write(format!(
                "write to {} failed: device disconnected",
                self.name
            )));
        }
        let mut tx = self.tx_buf.lock().await;
        tx.extend(buf);
        Ok(buf.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
