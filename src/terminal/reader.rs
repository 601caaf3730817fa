//! Background reader loop.
//!
//! One reader task runs per active connection. It polls the transport for
//! available bytes, decodes them with the output format the shell currently
//! has selected, and emits timestamped display events. The task never
//! touches the shell's thread of control; events cross on an mpsc channel.

use crate::terminal::codec;
use crate::terminal::transport::SerialTransport;
use crate::terminal::types::{DisplayEvent, OutputFormat};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const READ_BUF_SIZE: usize = 4096;

/// Handle to a running reader task.
pub struct ReaderHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    /// Signal cancellation and wait for the loop to observe it.
    ///
    /// After this returns the task has exited, so the transport can be
    /// closed without racing an in-flight read.
    pub async fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.task.await;
    }
}

/// Spawn the reader loop for an open transport.
///
/// `format_rx` is sampled on every decode, so a format change made by the
/// shell applies to the very next batch of bytes. `bytes_rx` is the shared
/// received-byte counter on the session.
pub fn spawn_reader(
    transport: Arc<dyn SerialTransport>,
    format_rx: watch::Receiver<OutputFormat>,
    event_tx: mpsc::Sender<DisplayEvent>,
    poll_interval: Duration,
    bytes_rx: Arc<AtomicU64>,
) -> ReaderHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();

    let task = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            if flag.load(Ordering::SeqCst) {
                break;
            }

            // Zero available bytes is the normal idle case, not an error.
            let available = transport.bytes_available().await.unwrap_or(0);
            if available == 0 {
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            match transport.read(&mut buf).await {
                Ok(0) => {}
                Ok(n) => {
                    bytes_rx.fetch_add(n as u64, Ordering::Relaxed);
                    let format = *format_rx.borrow();
                    let text = codec::decode(&buf[..n], format);
                    log::debug!(
                        "[terminal:{}] rx {} bytes ({})",
                        transport.port_name(),
                        n,
                        format.label()
                    );
                    if event_tx.send(DisplayEvent::now(text)).await.is_err() {
                        // Shell dropped the receiver; nothing left to serve.
                        break;
                    }
                }
                Err(e) => {
                    log::warn!(
                        "[terminal:{}] read error: {}",
                        transport.port_name(),
                        e
                    );
                    if event_tx
                        .send(DisplayEvent::now(format!("Read error: {}", e)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    });

    ReaderHandle { cancel, task }
}
