//! Tunnel lifecycle controller.
//!
//! [`TunnelProvider`] implements the operations the tunnel host expects:
//! startup, shutdown, configuration message handling, and the sleep/wake
//! no-ops. It owns the held configuration message, the lifecycle state,
//! and the running pump.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::StartError;
use crate::flow::PacketFlow;
use crate::host::SettingsHost;
use crate::message::TunnelMessage;
use crate::pump::{PacketPump, PumpHandle};
use crate::settings::build_network_settings;
use crate::types::{StopReason, TunnelState, OUTBOUND_QUEUE_CAPACITY};

/// Orchestrates tunnel startup and shutdown.
///
/// The held configuration message is process-wide state: it is replaced
/// by `handle_app_message` and read by `start_tunnel`, with a mutex
/// guarding the swap. Ordering between a concurrent update and start is
/// first-come.
pub struct TunnelProvider {
    engine: Arc<dyn Engine>,
    flow: Arc<dyn PacketFlow>,
    host: Arc<dyn SettingsHost>,
    message: Mutex<Option<TunnelMessage>>,
    state: Mutex<TunnelState>,
    pump: Mutex<Option<PumpHandle>>,
}

impl TunnelProvider {
    pub fn new(
        engine: Arc<dyn Engine>,
        flow: Arc<dyn PacketFlow>,
        host: Arc<dyn SettingsHost>,
    ) -> Self {
        Self {
            engine,
            flow,
            host,
            message: Mutex::new(None),
            state: Mutex::new(TunnelState::Idle),
            pump: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TunnelState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: TunnelState) {
        let mut guard = self.state.lock().expect("state lock poisoned");
        debug!(from = %*guard, to = %next, "tunnel state transition");
        *guard = next;
    }

    fn fail(&self, err: StartError) -> StartError {
        self.set_state(TunnelState::Failed);
        error!(error = %err, "tunnel start failed");
        err
    }

    /// Starts the tunnel from the held configuration message.
    ///
    /// Validates the engine payload, starts the engine, derives and
    /// applies network settings, then starts the packet pump. The pump is
    /// started even when the settings host rejects the application; that
    /// verdict is surfaced through the returned error while the tunnel
    /// keeps relaying.
    pub async fn start_tunnel(&self) -> Result<(), StartError> {
        self.set_state(TunnelState::Starting);

        let message = self
            .message
            .lock()
            .expect("message lock poisoned")
            .clone();
        let message = match message {
            Some(message) => message,
            None => return Err(self.fail(StartError::ConfigurationMissing)),
        };
        let config = match message.engine_config() {
            Some(config) => config.to_vec(),
            None => return Err(self.fail(StartError::ConfigurationMissing)),
        };

        // The outbound channel is the engine's write path back to the OS
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        if let Err(e) = self.engine.start(&config, outbound_tx).await {
            return Err(self.fail(StartError::EngineStart(e)));
        }
        info!(payload_len = config.len(), "engine started");

        // Checked only now: the engine may already be running when the
        // server address turns out to be missing.
        let server_address = match message.server_address() {
            Some(address) => address.to_string(),
            None => return Err(self.fail(StartError::ServerAddressMissing)),
        };

        let settings = build_network_settings(&server_address, &message);
        let apply_result = self.host.apply(&settings).await;
        if let Err(e) = &apply_result {
            warn!(error = %e, "network settings rejected, starting pump anyway");
        }

        let handle = PacketPump::spawn(self.flow.clone(), self.engine.clone(), outbound_rx);
        *self.pump.lock().expect("pump lock poisoned") = Some(handle);
        self.set_state(TunnelState::Running);
        info!(remote = %server_address, "tunnel running");

        apply_result.map_err(StartError::SettingsApplication)
    }

    /// Stops the tunnel. Never fails and returns exactly once, whether or
    /// not a pump was running.
    pub async fn stop_tunnel(&self, reason: StopReason) {
        self.set_state(TunnelState::Stopping);
        let handle = self.pump.lock().expect("pump lock poisoned").take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        self.set_state(TunnelState::Stopped);
        info!(%reason, "tunnel stopped");
    }

    /// Handles a configuration message from the controlling process.
    ///
    /// Pure state replacement: the decode result is stored for a
    /// subsequent `start_tunnel`, so a malformed payload clears the held
    /// message. Never starts or stops the tunnel. The input payload is
    /// echoed back as the response.
    pub fn handle_app_message(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let decoded = TunnelMessage::decode(payload);
        match &decoded {
            Ok(_) => debug!(payload_len = payload.len(), "configuration message stored"),
            Err(e) => warn!(error = %e, "configuration message failed to decode"),
        }
        *self.message.lock().expect("message lock poisoned") = decoded.ok();
        Some(payload.to_vec())
    }

    /// Host sleep notification. No side effects.
    pub async fn sleep(&self) {}

    /// Host wake notification. No side effects.
    pub fn wake(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{wait_until, CaptureHost, RecordingEngine, ScriptedFlow};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use std::time::Duration;

    struct Fixture {
        provider: TunnelProvider,
        engine: Arc<RecordingEngine>,
        flow: Arc<ScriptedFlow>,
        host: Arc<CaptureHost>,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(RecordingEngine::new());
        let flow = Arc::new(ScriptedFlow::new());
        let host = Arc::new(CaptureHost::new());
        let provider = TunnelProvider::new(engine.clone(), flow.clone(), host.clone());
        Fixture {
            provider,
            engine,
            flow,
            host,
        }
    }

    fn payload(config: Option<&[u8]>, server_ip: Option<&str>) -> Vec<u8> {
        let mut doc = serde_json::Map::new();
        if let Some(config) = config {
            doc.insert(
                "configData".to_string(),
                serde_json::Value::String(STANDARD.encode(config)),
            );
        }
        if let Some(ip) = server_ip {
            doc.insert(
                "serverIP".to_string(),
                serde_json::Value::String(ip.to_string()),
            );
        }
        serde_json::Value::Object(doc).to_string().into_bytes()
    }

    fn pump_running(provider: &TunnelProvider) -> bool {
        provider.pump.lock().unwrap().is_some()
    }

    #[tokio::test]
    async fn test_start_succeeds_with_full_message() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"engine-config"), Some("1.2.3.4")));

        f.provider.start_tunnel().await.unwrap();

        assert_eq!(f.provider.state(), TunnelState::Running);
        assert_eq!(f.engine.start_payloads(), vec![b"engine-config".to_vec()]);
        let applied = f.host.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].remote_address, "1.2.3.4");
        // No explicit inclusions: exactly one route-everything entry
        assert_eq!(applied[0].included_routes.len(), 1);
        assert!(pump_running(&f.provider));

        f.provider.stop_tunnel(StopReason::Requested).await;
    }

    #[tokio::test]
    async fn test_start_without_any_message_is_configuration_missing() {
        let f = fixture();

        let err = f.provider.start_tunnel().await.unwrap_err();

        assert!(matches!(err, StartError::ConfigurationMissing));
        assert_eq!(f.provider.state(), TunnelState::Failed);
        assert_eq!(f.engine.start_count(), 0);
        assert!(f.host.applied().is_empty());
        assert!(!pump_running(&f.provider));
    }

    #[tokio::test]
    async fn test_start_without_engine_config_is_configuration_missing() {
        let f = fixture();
        f.provider.handle_app_message(&payload(None, Some("1.2.3.4")));

        let err = f.provider.start_tunnel().await.unwrap_err();

        assert!(matches!(err, StartError::ConfigurationMissing));
        assert_eq!(f.engine.start_count(), 0);
        assert!(!pump_running(&f.provider));
    }

    #[tokio::test]
    async fn test_missing_server_address_after_engine_start() {
        let f = fixture();
        f.provider.handle_app_message(&payload(Some(b"cfg"), None));

        let err = f.provider.start_tunnel().await.unwrap_err();

        assert!(matches!(err, StartError::ServerAddressMissing));
        // Non-atomic ordering: the engine was already told to start
        assert_eq!(f.engine.start_count(), 1);
        assert!(f.host.applied().is_empty());
        assert_eq!(f.provider.state(), TunnelState::Failed);
        assert!(!pump_running(&f.provider));
    }

    #[tokio::test]
    async fn test_engine_start_failure_is_surfaced() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"cfg"), Some("1.2.3.4")));
        f.engine.fail_next_start();

        let err = f.provider.start_tunnel().await.unwrap_err();

        assert!(matches!(err, StartError::EngineStart(_)));
        assert_eq!(f.provider.state(), TunnelState::Failed);
        assert!(!pump_running(&f.provider));
    }

    #[tokio::test]
    async fn test_settings_rejection_still_starts_pump() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"cfg"), Some("1.2.3.4")));
        f.host.fail_next_apply();

        let err = f.provider.start_tunnel().await.unwrap_err();

        assert!(matches!(err, StartError::SettingsApplication(_)));
        assert_eq!(f.provider.state(), TunnelState::Running);
        assert!(pump_running(&f.provider));

        // The tunnel relays despite the rejected settings
        f.flow.push_batch(vec![vec![0x45, 0x01]]);
        assert!(wait_until(|| f.engine.inputs().len() == 1).await);

        f.provider.stop_tunnel(StopReason::Requested).await;
    }

    #[tokio::test]
    async fn test_stop_halts_reads_and_completes_once() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"cfg"), Some("1.2.3.4")));
        f.provider.start_tunnel().await.unwrap();

        f.flow.push_batch(vec![vec![1]]);
        assert!(wait_until(|| f.engine.inputs().len() == 1).await);

        f.provider.stop_tunnel(StopReason::Requested).await;
        assert_eq!(f.provider.state(), TunnelState::Stopped);
        assert!(!pump_running(&f.provider));

        // No further submissions after stop
        f.flow.push_batch(vec![vec![2]]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.engine.inputs(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn test_stop_without_pump_completes() {
        let f = fixture();
        f.provider.stop_tunnel(StopReason::Failure).await;
        assert_eq!(f.provider.state(), TunnelState::Stopped);
    }

    #[tokio::test]
    async fn test_engine_output_reaches_interface_in_order() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"cfg"), Some("1.2.3.4")));
        f.provider.start_tunnel().await.unwrap();

        f.engine.emit(vec![0x45, 0x01]);
        f.engine.emit(vec![0x45, 0x02]);
        f.engine.emit(vec![0x45, 0x03]);

        assert!(wait_until(|| f.flow.writes().len() == 3).await);
        let payloads: Vec<Vec<u8>> = f.flow.writes().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            payloads,
            vec![vec![0x45, 0x01], vec![0x45, 0x02], vec![0x45, 0x03]]
        );

        f.provider.stop_tunnel(StopReason::Requested).await;
    }

    #[tokio::test]
    async fn test_app_message_echoes_and_replaces() {
        let f = fixture();

        let first = payload(Some(b"first"), Some("1.1.1.1"));
        let response = f.provider.handle_app_message(&first);
        assert_eq!(response, Some(first.clone()));

        let second = payload(Some(b"second"), Some("2.2.2.2"));
        f.provider.handle_app_message(&second);

        f.provider.start_tunnel().await.unwrap();
        assert_eq!(f.engine.start_payloads(), vec![b"second".to_vec()]);

        f.provider.stop_tunnel(StopReason::Superseded).await;
    }

    #[tokio::test]
    async fn test_malformed_message_clears_held_configuration() {
        let f = fixture();
        f.provider
            .handle_app_message(&payload(Some(b"cfg"), Some("1.2.3.4")));

        let response = f.provider.handle_app_message(b"not json");
        assert_eq!(response, Some(b"not json".to_vec()));

        let err = f.provider.start_tunnel().await.unwrap_err();
        assert!(matches!(err, StartError::ConfigurationMissing));
    }

    #[tokio::test]
    async fn test_sleep_and_wake_are_no_ops() {
        let f = fixture();
        f.provider.sleep().await;
        f.provider.wake();
        assert_eq!(f.provider.state(), TunnelState::Idle);
    }
}
