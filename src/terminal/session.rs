//! Session controller.
//!
//! The orchestration layer driven by the presentation shell: `connect`,
//! `disconnect`, and `send` sequence the transport and the reader loop and
//! turn every outcome into display events and shell notifications.

use crate::terminal::codec;
use crate::terminal::reader::{spawn_reader, ReaderHandle};
use crate::terminal::transport::{SerialTransport, SystemTransport};
use crate::terminal::types::*;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Builds a transport for a connection attempt. Swappable so tests run
/// against a simulated transport.
pub type TransportFactory =
    Box<dyn Fn(&ConnectionConfig) -> Arc<dyn SerialTransport> + Send + Sync>;

/// Receiving ends of the controller's output channels, consumed by the
/// shell on its own schedule.
pub struct SessionChannels {
    /// Append-only log stream; emission order is preserved on delivery.
    pub events: mpsc::Receiver<DisplayEvent>,
    /// Status-label and input-field signals.
    pub notifications: mpsc::Receiver<UiNotification>,
}

struct ActiveConnection {
    transport: Arc<dyn SerialTransport>,
    reader: ReaderHandle,
}

/// Single-session connect/disconnect/send state machine.
///
/// Invariants: the reader loop runs iff the state is `Connected`, and at
/// most one reader instance exists per connection lifetime. Disconnecting
/// joins the reader before the transport is closed.
pub struct SessionController {
    state: ConnectionState,
    active: Option<ActiveConnection>,
    factory: TransportFactory,
    format_rx: watch::Receiver<OutputFormat>,
    event_tx: mpsc::Sender<DisplayEvent>,
    ui_tx: mpsc::Sender<UiNotification>,
    bytes_rx: Arc<AtomicU64>,
    bytes_tx: Arc<AtomicU64>,
    connected_at: Option<DateTime<Utc>>,
}

impl SessionController {
    /// Create a controller backed by real serial hardware.
    ///
    /// `format_rx` is the shell-owned output format selector; the core
    /// samples it per decode and never caches it.
    pub fn new(format_rx: watch::Receiver<OutputFormat>) -> (Self, SessionChannels) {
        Self::with_transport_factory(
            Box::new(|config| SystemTransport::new(config.port.clone()) as Arc<dyn SerialTransport>),
            format_rx,
        )
    }

    /// Create a controller with a custom transport factory (tests, demos).
    pub fn with_transport_factory(
        factory: TransportFactory,
        format_rx: watch::Receiver<OutputFormat>,
    ) -> (Self, SessionChannels) {
        let (event_tx, events) = mpsc::channel(256);
        let (ui_tx, notifications) = mpsc::channel(64);
        let controller = Self {
            state: ConnectionState::Disconnected,
            active: None,
            factory,
            format_rx,
            event_tx,
            ui_tx,
            bytes_rx: Arc::new(AtomicU64::new(0)),
            bytes_tx: Arc::new(AtomicU64::new(0)),
            connected_at: None,
        };
        (
            controller,
            SessionChannels {
                events,
                notifications,
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session snapshot for the shell.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            port_name: self
                .active
                .as_ref()
                .map(|a| a.transport.port_name().to_string())
                .unwrap_or_default(),
            state: self.state,
            connected_at: self.connected_at,
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
        }
    }

    /// Open the port and start the reader loop.
    ///
    /// Only valid while disconnected. On failure the state stays
    /// `Disconnected`, the failure reason is emitted as a display event,
    /// and no reader is started.
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<(), TerminalError> {
        if self.state == ConnectionState::Connected {
            return Err(TerminalError::already_connected(
                self.active
                    .as_ref()
                    .map(|a| a.transport.port_name())
                    .unwrap_or_default(),
            ));
        }

        let transport = (self.factory)(&config);
        if let Err(e) = transport.open(&config).await {
            log::warn!("[terminal:{}] open failed: {}", config.port, e);
            self.emit(format!("Connection Error: {}", e)).await;
            return Err(e);
        }

        self.bytes_rx.store(0, Ordering::Relaxed);
        self.bytes_tx.store(0, Ordering::Relaxed);

        let reader = spawn_reader(
            transport.clone(),
            self.format_rx.clone(),
            self.event_tx.clone(),
            Duration::from_millis(config.poll_interval_ms),
            self.bytes_rx.clone(),
        );

        self.active = Some(ActiveConnection { transport, reader });
        self.state = ConnectionState::Connected;
        self.connected_at = Some(Utc::now());

        log::info!(
            "[terminal:{}] connected at {} baud",
            config.port,
            config.baud_rate
        );
        self.emit(format!(
            "Connected to {} at {} baud.",
            config.port, config.baud_rate
        ))
        .await;
        self.notify(UiNotification::StateChanged(ConnectionState::Connected))
            .await;
        Ok(())
    }

    /// Stop the reader loop and close the port.
    ///
    /// A safe no-op when already disconnected: emits nothing rather than
    /// double-closing.
    pub async fn disconnect(&mut self) -> Result<(), TerminalError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        // The reader must observe cancellation before the handle goes
        // away, so stale buffered bytes never surface after this point.
        active.reader.stop().await;
        if let Err(e) = active.transport.close().await {
            log::warn!(
                "[terminal:{}] close failed: {}",
                active.transport.port_name(),
                e
            );
        }

        self.state = ConnectionState::Disconnected;
        log::info!("[terminal:{}] disconnected", active.transport.port_name());
        self.emit("Disconnected.").await;
        self.notify(UiNotification::StateChanged(ConnectionState::Disconnected))
            .await;
        Ok(())
    }

    /// Parse the typed input as base-2 byte tokens and write them out.
    ///
    /// Invalid tokens are reported individually and skipped; the valid
    /// bytes are still sent. A successful write signals the shell to clear
    /// the input field. A failed write leaves the session connected — the
    /// user may retry or disconnect manually.
    pub async fn send(&mut self, text: &str) -> Result<(), TerminalError> {
        let Some(active) = self.active.as_ref() else {
            self.emit(TerminalError::not_connected().to_string()).await;
            return Ok(());
        };

        let parsed = match codec::encode_tokens(text) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.emit("No data to send.").await;
                return Ok(());
            }
        };

        for token in &parsed.invalid_tokens {
            self.emit(TerminalError::invalid_token(token).to_string())
                .await;
        }
        if parsed.bytes.is_empty() {
            return Ok(());
        }

        match active.transport.write(&parsed.bytes).await {
            Ok(n) => {
                self.bytes_tx.fetch_add(n as u64, Ordering::Relaxed);
                log::debug!(
                    "[terminal:{}] tx {} bytes",
                    active.transport.port_name(),
                    n
                );
                self.emit(format!("Sent: {}", parsed.valid_tokens.join(" ")))
                    .await;
                self.notify(UiNotification::ClearInput).await;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "[terminal:{}] write failed: {}",
                    active.transport.port_name(),
                    e
                );
                self.emit(format!("Write error: {}", e)).await;
                Err(e)
            }
        }
    }

    async fn emit(&self, text: impl Into<String>) {
        let _ = self.event_tx.send(DisplayEvent::now(text.into())).await;
    }

    async fn notify(&self, notification: UiNotification) {
        let _ = self.ui_tx.send(notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::transport::SimulatedTransport;

    const POLL_MS: u64 = 5;

    fn controller_with_sim(
        port: &str,
        format: OutputFormat,
    ) -> (
        SessionController,
        SessionChannels,
        Arc<SimulatedTransport>,
        watch::Sender<OutputFormat>,
    ) {
        let transport = SimulatedTransport::new(port);
        let shared = transport.clone();
        let factory: TransportFactory =
            Box::new(move |_config| shared.clone() as Arc<dyn SerialTransport>);
        let (format_tx, format_rx) = watch::channel(format);
        let (controller, channels) =
            SessionController::with_transport_factory(factory, format_rx);
        (controller, channels, transport, format_tx)
    }

    fn config(port: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(port, 9600);
        config.poll_interval_ms = POLL_MS;
        config
    }

    async fn recv_event(channels: &mut SessionChannels) -> DisplayEvent {
        tokio::time::timeout(Duration::from_secs(1), channels.events.recv())
            .await
            .expect("timed out waiting for display event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_connect_emits_event_and_status() {
        let (mut controller, mut channels, _t, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        assert_eq!(controller.state(), ConnectionState::Connected);

        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Connected to COM1 at 9600 baud.");
        assert_eq!(
            channels.notifications.recv().await,
            Some(UiNotification::StateChanged(ConnectionState::Connected))
        );

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM9", OutputFormat::Binary);
        transport.set_fail_open(true);

        let err = controller.connect(config("COM9")).await.unwrap_err();
        assert_eq!(err.kind, TerminalErrorKind::ConnectionOpen);
        assert_eq!(controller.state(), ConnectionState::Disconnected);

        let event = recv_event(&mut channels).await;
        assert!(event.text.starts_with("Connection Error:"));
        assert!(event.text.contains("COM9"));

        // No reader was started: nothing else arrives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(channels.events.try_recv().is_err());
        assert!(channels.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (mut controller, mut channels, _t, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;

        let err = controller.connect(config("COM1")).await.unwrap_err();
        assert_eq!(err.kind, TerminalErrorKind::AlreadyConnected);
        // The rejected transition emits nothing.
        assert!(channels.events.try_recv().is_err());

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_ascii_then_binary() {
        let (mut controller, mut channels, transport, format_tx) =
            controller_with_sim("COM1", OutputFormat::Ascii);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await; // "Connected to ..."

        transport.inject_rx(&[0b0100_0001]).await;
        let event = recv_event(&mut channels).await;
        assert!(event.text.ends_with('A'));

        format_tx.send(OutputFormat::Binary).unwrap();
        transport.inject_rx(&[0b0000_0001]).await;
        let event = recv_event(&mut channels).await;
        assert!(event.text.ends_with("00000001"));

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_valid_tokens() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;
        let _ = channels.notifications.recv().await;

        controller.send("101 11111111 1000").await.unwrap();
        assert_eq!(transport.drain_tx().await, vec![5, 255, 8]);

        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Sent: 101 11111111 1000");
        assert_eq!(
            channels.notifications.recv().await,
            Some(UiNotification::ClearInput)
        );

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_invalid_tokens_and_sends_rest() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;

        controller.send("101 xx 1000").await.unwrap();

        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Invalid binary value: xx");
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Sent: 101 1000");
        assert_eq!(transport.drain_tx().await, vec![5, 8]);

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_all_invalid_writes_nothing() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;

        controller.send("xx yy").await.unwrap();
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Invalid binary value: xx");
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Invalid binary value: yy");
        assert!(transport.drain_tx().await.is_empty());

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_empty_input() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;

        controller.send("   ").await.unwrap();
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "No data to send.");
        assert!(transport.drain_tx().await.is_empty());

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (mut controller, mut channels, _t, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.send("101").await.unwrap();
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Not connected.");
    }

    #[tokio::test]
    async fn test_write_failure_leaves_session_connected() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;
        let _ = channels.notifications.recv().await;

        transport.set_fail_writes(true);
        let err = controller.send("101").await.unwrap_err();
        assert_eq!(err.kind, TerminalErrorKind::ConnectionWrite);

        let event = recv_event(&mut channels).await;
        assert!(event.text.starts_with("Write error:"));
        // Explicit policy: still connected, input not cleared.
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert!(channels.notifications.try_recv().is_err());

        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_emits_and_is_idempotent() {
        let (mut controller, mut channels, _t, _f) =
            controller_with_sim("COM1", OutputFormat::Binary);

        controller.connect(config("COM1")).await.unwrap();
        let _ = recv_event(&mut channels).await;
        let _ = channels.notifications.recv().await;

        controller.disconnect().await.unwrap();
        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Disconnected.");
        assert_eq!(
            channels.notifications.recv().await,
            Some(UiNotification::StateChanged(ConnectionState::Disconnected))
        );

        // Second disconnect: safe no-op, no spurious event.
        controller.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(channels.events.try_recv().is_err());
        assert!(channels.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_drops_pending_unread_byte() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM1", OutputFormat::Ascii);

        // Long poll interval: the reader goes idle before the byte lands.
        let mut config = config("COM1");
        config.poll_interval_ms = 500;
        controller.connect(config).await.unwrap();
        let _ = recv_event(&mut channels).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.inject_rx(b"Z").await;
        controller.disconnect().await.unwrap();

        let event = recv_event(&mut channels).await;
        assert_eq!(event.text, "Disconnected.");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(channels.events.try_recv().is_err(), "stale data surfaced");
    }

    #[tokio::test]
    async fn test_info_counters() {
        let (mut controller, mut channels, transport, _f) =
            controller_with_sim("COM7", OutputFormat::Binary);

        assert_eq!(controller.info().state, ConnectionState::Disconnected);

        controller.connect(config("COM7")).await.unwrap();
        let _ = recv_event(&mut channels).await;

        controller.send("1 10").await.unwrap();
        let _ = recv_event(&mut channels).await;

        transport.inject_rx(&[7]).await;
        let _ = recv_event(&mut channels).await;

        let info = controller.info();
        assert_eq!(info.port_name, "COM7");
        assert_eq!(info.state, ConnectionState::Connected);
        assert!(info.connected_at.is_some());
        assert_eq!(info.bytes_tx, 2);
        assert_eq!(info.bytes_rx, 1);

        controller.disconnect().await.unwrap();
    }
}
