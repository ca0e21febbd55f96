//! Tunneling engine collaborator contract.
//!
//! The engine is a black box: it receives raw IP packets, performs the
//! actual proxying/tunneling, and asynchronously hands processed packets
//! back through the outbound channel it was given at start. This layer
//! never inspects the engine configuration payload.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors reported by an engine at startup.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected its configuration payload.
    #[error("engine rejected configuration: {0}")]
    Configuration(String),

    /// The engine failed to initialize.
    #[error("engine failed to start: {0}")]
    Unavailable(String),
}

/// External packet-tunneling engine.
///
/// Implementations must be safe to call from multiple concurrent call
/// sites: `input_packet` is invoked from the pump's submit task while
/// lifecycle operations may run elsewhere.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Starts the engine with an opaque configuration payload.
    ///
    /// `outbound` is the engine's write path: every packet sent on it is
    /// written back to the OS interface. Engines with no synchronous
    /// readiness signal return `Ok(())` unconditionally; an engine that
    /// can report startup failure has it surfaced from tunnel startup.
    async fn start(
        &self,
        config: &[u8],
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), EngineError>;

    /// Submits one packet to the engine. Fire-and-forget: no
    /// acknowledgement, no backpressure, failures are not observable.
    fn input_packet(&self, packet: Vec<u8>);
}

/// Engine that echoes every input packet back through the outbound
/// channel. Default wiring for the binary and scaffolding for tests; it
/// exercises both pump directions without proxying anything.
#[derive(Default)]
pub struct LoopbackEngine {
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Engine for LoopbackEngine {
    async fn start(
        &self,
        config: &[u8],
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), EngineError> {
        if config.is_empty() {
            return Err(EngineError::Configuration("empty payload".to_string()));
        }
        *self.outbound.lock().expect("outbound lock poisoned") = Some(outbound);
        debug!(payload_len = config.len(), "loopback engine started");
        Ok(())
    }

    fn input_packet(&self, packet: Vec<u8>) {
        let guard = self.outbound.lock().expect("outbound lock poisoned");
        if let Some(tx) = guard.as_ref() {
            // Dropped when the channel is full or closed, like any engine
            // whose write side has gone away.
            if tx.try_send(packet).is_err() {
                debug!("loopback engine dropped packet");
            }
        }
    }
}
