//! Scripted collaborator doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tunnel_common::TunnelError;

use crate::engine::{Engine, EngineError};
use crate::flow::PacketFlow;
use crate::host::SettingsHost;
use crate::settings::NetworkSettings;
use crate::types::AddressFamily;

/// Polls a condition until it holds or a two-second deadline passes.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Packet flow whose read batches are scripted by the test; writes are
/// recorded with their family tag.
#[derive(Default)]
pub(crate) struct ScriptedFlow {
    batches: Mutex<VecDeque<Vec<Vec<u8>>>>,
    notify: Notify,
    writes: Mutex<Vec<(Vec<u8>, AddressFamily)>>,
}

impl ScriptedFlow {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_batch(&self, batch: Vec<Vec<u8>>) {
        self.batches
            .lock()
            .expect("batches lock poisoned")
            .push_back(batch);
        self.notify.notify_one();
    }

    pub(crate) fn writes(&self) -> Vec<(Vec<u8>, AddressFamily)> {
        self.writes.lock().expect("writes lock poisoned").clone()
    }
}

#[async_trait]
impl PacketFlow for ScriptedFlow {
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>> {
        loop {
            if let Some(batch) = self
                .batches
                .lock()
                .expect("batches lock poisoned")
                .pop_front()
            {
                return Ok(batch);
            }
            self.notify.notified().await;
        }
    }

    fn write_packet(&self, packet: &[u8], family: AddressFamily) -> io::Result<()> {
        self.writes
            .lock()
            .expect("writes lock poisoned")
            .push((packet.to_vec(), family));
        Ok(())
    }
}

/// Engine recording start payloads and submitted packets; startup can be
/// scripted to fail, and the stored outbound sender lets tests emit
/// engine output.
#[derive(Default)]
pub(crate) struct RecordingEngine {
    starts: Mutex<Vec<Vec<u8>>>,
    inputs: Mutex<Vec<Vec<u8>>>,
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    fail_start: AtomicBool,
}

impl RecordingEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub(crate) fn start_count(&self) -> usize {
        self.starts.lock().expect("starts lock poisoned").len()
    }

    pub(crate) fn start_payloads(&self) -> Vec<Vec<u8>> {
        self.starts.lock().expect("starts lock poisoned").clone()
    }

    pub(crate) fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().expect("inputs lock poisoned").clone()
    }

    /// Emits a packet as if the engine produced it.
    pub(crate) fn emit(&self, packet: Vec<u8>) {
        let guard = self.outbound.lock().expect("outbound lock poisoned");
        if let Some(tx) = guard.as_ref() {
            tx.try_send(packet).expect("outbound channel full");
        }
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn start(
        &self,
        config: &[u8],
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), EngineError> {
        self.starts
            .lock()
            .expect("starts lock poisoned")
            .push(config.to_vec());
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Unavailable("scripted failure".to_string()));
        }
        *self.outbound.lock().expect("outbound lock poisoned") = Some(outbound);
        Ok(())
    }

    fn input_packet(&self, packet: Vec<u8>) {
        self.inputs
            .lock()
            .expect("inputs lock poisoned")
            .push(packet);
    }
}

/// Engine whose `input_packet` parks until released, for exercising the
/// submit queue under pressure. Only usable on a multi-thread runtime.
#[derive(Default)]
pub(crate) struct BlockingEngine {
    blocked: Mutex<bool>,
    released: Condvar,
    waiting: AtomicUsize,
    inputs: Mutex<Vec<Vec<u8>>>,
}

impl BlockingEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn block(&self) {
        *self.blocked.lock().expect("blocked lock poisoned") = true;
    }

    pub(crate) fn unblock(&self) {
        *self.blocked.lock().expect("blocked lock poisoned") = false;
        self.released.notify_all();
    }

    pub(crate) fn blocked_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub(crate) fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().expect("inputs lock poisoned").clone()
    }
}

#[async_trait]
impl Engine for BlockingEngine {
    async fn start(
        &self,
        _config: &[u8],
        _outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn input_packet(&self, packet: Vec<u8>) {
        let mut guard = self.blocked.lock().expect("blocked lock poisoned");
        self.waiting.fetch_add(1, Ordering::SeqCst);
        while *guard {
            guard = self.released.wait(guard).expect("blocked lock poisoned");
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .expect("inputs lock poisoned")
            .push(packet);
    }
}

/// Settings host recording every application; the verdict is scriptable.
#[derive(Default)]
pub(crate) struct CaptureHost {
    applied: Mutex<Vec<NetworkSettings>>,
    fail: AtomicBool,
}

impl CaptureHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_apply(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn applied(&self) -> Vec<NetworkSettings> {
        self.applied.lock().expect("applied lock poisoned").clone()
    }
}

#[async_trait]
impl SettingsHost for CaptureHost {
    async fn apply(&self, settings: &NetworkSettings) -> Result<(), TunnelError> {
        self.applied
            .lock()
            .expect("applied lock poisoned")
            .push(settings.clone());
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(TunnelError::internal("scripted apply failure"));
        }
        Ok(())
    }
}
