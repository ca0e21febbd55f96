//! Startup error taxonomy.
//!
//! Every startup failure is surfaced exactly once through the
//! `start_tunnel` result; packet-pump errors are logged and dropped, and
//! stopping never fails.

use thiserror::Error;
use tunnel_common::TunnelError;

use crate::engine::EngineError;

/// Errors surfaced from tunnel startup.
#[derive(Debug, Error)]
pub enum StartError {
    /// No engine configuration payload is held. The engine and the pump
    /// are not started.
    #[error("tunnel message carries no engine configuration")]
    ConfigurationMissing,

    /// The held message has no server address. Checked during settings
    /// derivation, after the engine was already told to start.
    #[error("tunnel message carries no server address")]
    ServerAddressMissing,

    /// The engine reported a startup failure.
    #[error(transparent)]
    EngineStart(#[from] EngineError),

    /// The OS rejected the derived network settings. The pump is started
    /// regardless; the rejection is only reported.
    #[error("network settings application failed: {0}")]
    SettingsApplication(#[source] TunnelError),
}
