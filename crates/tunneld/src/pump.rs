//! Bidirectional packet relay between the OS packet flow and the engine.
//!
//! The pump is three tasks bound to one cancellation token:
//!
//! - the read loop requests packet batches from the flow and feeds a
//!   bounded submit queue (newest packet dropped when full),
//! - the submit task drains the queue into the engine,
//! - the write-back task receives engine output and writes each packet to
//!   the flow tagged with its derived address family.
//!
//! Stopping the pump ceases new read requests; a read already in flight
//! is dropped and its result discarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::flow::PacketFlow;
use crate::types::{AddressFamily, SUBMIT_QUEUE_CAPACITY};

/// Continuous bidirectional relay between packet flow and engine.
pub struct PacketPump;

/// Handle to a running pump. Shutting down cancels all pump tasks and
/// awaits their exit.
pub struct PumpHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PacketPump {
    /// Spawns the pump tasks. `outbound` carries packets the engine hands
    /// back for writing to the interface.
    pub fn spawn(
        flow: Arc<dyn PacketFlow>,
        engine: Arc<dyn Engine>,
        outbound: mpsc::Receiver<Vec<u8>>,
    ) -> PumpHandle {
        Self::spawn_with_capacity(flow, engine, outbound, SUBMIT_QUEUE_CAPACITY)
    }

    fn spawn_with_capacity(
        flow: Arc<dyn PacketFlow>,
        engine: Arc<dyn Engine>,
        outbound: mpsc::Receiver<Vec<u8>>,
        capacity: usize,
    ) -> PumpHandle {
        let cancel = CancellationToken::new();
        let (submit_tx, submit_rx) = mpsc::channel(capacity);

        let tasks = vec![
            tokio::spawn(read_loop(flow.clone(), submit_tx, cancel.clone())),
            tokio::spawn(submit_loop(engine, submit_rx, cancel.clone())),
            tokio::spawn(write_back_loop(flow, outbound, cancel.clone())),
        ];

        PumpHandle { cancel, tasks }
    }
}

impl PumpHandle {
    /// Cancels the pump and awaits all tasks. An in-flight read is dropped
    /// with its result discarded.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// OS → engine: one outstanding read at a time, batches submitted in
/// order received. Read errors terminate the loop.
async fn read_loop(
    flow: Arc<dyn PacketFlow>,
    submit_tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    let mut dropped: u64 = 0;
    loop {
        // Stop boundary: no new read is issued once cancelled
        if cancel.is_cancelled() {
            break;
        }
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            result = flow.read_packets() => match result {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "packet flow read failed, stopping read loop");
                    break;
                }
            },
        };
        for packet in batch {
            match submit_tx.try_send(packet) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(dropped, "engine submit queue full, dropping packet");
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }
}

/// Drains the submit queue into the engine. Submission is fire-and-forget;
/// engine-side failures are not observable here.
async fn submit_loop(
    engine: Arc<dyn Engine>,
    mut submit_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            packet = submit_rx.recv() => match packet {
                Some(packet) => engine.input_packet(packet),
                None => break,
            },
        }
    }
}

/// Engine → OS: one packet per channel receive, written with the family
/// derived from the packet header. Write failures are logged and dropped.
async fn write_back_loop(
    flow: Arc<dyn PacketFlow>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            packet = outbound.recv() => match packet {
                Some(packet) => {
                    let family = AddressFamily::from_packet(&packet);
                    if let Err(e) = flow.write_packet(&packet, family) {
                        debug!(error = %e, "interface write failed");
                    }
                }
                None => break,
            },
        }
    }
}
