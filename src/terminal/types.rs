//! Shared types for the terminal core.
//!
//! Covers connection configuration, session state, display events,
//! shell notifications, and the error type.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serial connection configuration. Immutable once a connection attempt
/// starts; the shell supplies a fresh one on every `connect()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Port name (e.g. `COM3`, `/dev/ttyUSB0`).
    pub port: String,

    /// Baud rate. Must be a positive integer.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Idle sleep between reader-loop polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_poll_interval() -> u64 {
    20
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Output format
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rendering applied to received bytes. The shell owns the selector; the
/// reader loop samples the current value on every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// Space-separated 8-character zero-padded base-2 groups.
    Binary,
    /// ASCII text; bytes outside the ASCII range render as `U+FFFD`.
    Ascii,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Binary
    }
}

impl OutputFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Binary => "Binary",
            Self::Ascii => "ASCII",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session state & events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State of the (single) session. The reader loop runs iff `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A timestamped unit of text destined for the shell's log view.
/// Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    /// Wall-clock time, truncated to whole seconds.
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl DisplayEvent {
    /// Create an event stamped with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        let ts = Utc::now();
        Self {
            timestamp: ts.with_nanosecond(0).unwrap_or(ts),
            text: text.into(),
        }
    }

    /// Log-view line in the `[HH:MM:SS]: text` shape.
    pub fn formatted(&self) -> String {
        format!("[{}]: {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Out-of-band signals to the shell (status label, input field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiNotification {
    /// Connection state changed; update status/button labels.
    StateChanged(ConnectionState),
    /// A send succeeded; clear the input field.
    ClearInput,
}

/// Snapshot of the live session for the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Port name, empty when never connected.
    pub port_name: String,
    pub state: ConnectionState,
    /// When the current connection was opened.
    pub connected_at: Option<DateTime<Utc>>,
    /// Bytes received over the current connection.
    pub bytes_rx: u64,
    /// Bytes transmitted over the current connection.
    pub bytes_tx: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Category of a terminal error. None is fatal; all are recovered at the
/// session controller and reported on the display event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminalErrorKind {
    /// Port unavailable / invalid baud. Recoverable by retrying connect.
    ConnectionOpen,
    /// Write failed after connect. The session stays connected.
    ConnectionWrite,
    /// One malformed token in a send request.
    InvalidToken,
    /// Nothing to send.
    EmptyInput,
    NotConnected,
    AlreadyConnected,
    /// Other I/O failure (reader-side reads, port enumeration).
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalError {
    pub kind: TerminalErrorKind,
    pub message: String,
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TerminalError {}

impl TerminalError {
    pub fn new(kind: TerminalErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn connection_open(msg: impl Into<String>) -> Self {
        Self::new(TerminalErrorKind::ConnectionOpen, msg)
    }

    pub fn connection_write(msg: impl Into<String>) -> Self {
        Self::new(TerminalErrorKind::ConnectionWrite, msg)
    }

    pub fn invalid_token(token: &str) -> Self {
        Self::new(
            TerminalErrorKind::InvalidToken,
            format!("Invalid binary value: {}", token),
        )
    }

    pub fn empty_input() -> Self {
        Self::new(TerminalErrorKind::EmptyInput, "nothing to send")
    }

    pub fn not_connected() -> Self {
        Self::new(TerminalErrorKind::NotConnected, "Not connected.")
    }

    pub fn already_connected(port: &str) -> Self {
        Self::new(
            TerminalErrorKind::AlreadyConnected,
            format!("Already connected to {}", port),
        )
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(TerminalErrorKind::Io, msg)
    }
}
