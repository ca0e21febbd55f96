//! tunneld - packet tunnel adapter daemon
//!
//! tunneld bridges the OS virtual network interface and an external
//! packet-tunneling engine, handling:
//! - Tunnel lifecycle (startup validation, shutdown)
//! - Network settings derivation from configuration messages
//! - Interface configuration through `ip` commands
//! - Bidirectional packet relay between the interface and the engine

pub mod commands;
pub mod engine;
pub mod error;
pub mod flow;
pub mod host;
pub mod message;
pub mod provider;
pub mod pump;
pub mod settings;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{Engine, EngineError, LoopbackEngine};
pub use error::StartError;
pub use flow::{PacketFlow, TunPacketFlow};
pub use host::{SettingsHost, ShellSettingsHost};
pub use message::TunnelMessage;
pub use provider::TunnelProvider;
pub use pump::{PacketPump, PumpHandle};
pub use settings::{build_network_settings, NetworkSettings};
pub use types::{AddressFamily, StopReason, TunnelState};
