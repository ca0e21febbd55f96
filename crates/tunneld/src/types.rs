//! Tunnel type definitions and constants

/// Default tunnel interface name
pub const TUNNEL_INTERFACE: &str = "tun0";

/// MTU applied to the tunnel interface
pub const TUNNEL_MTU: u16 = 1500;

/// Local tunnel address pair applied to the interface.
/// Both entries use the same private address with different masks.
pub const TUNNEL_ADDRESSES: [(&str, &str); 2] = [
    ("26.26.26.2", "255.255.255.0"),
    ("26.26.26.2", "255.255.255.252"),
];

/// Route-everything entry used when no included routes are configured
pub const DEFAULT_ROUTE: (&str, &str) = ("0.0.0.0", "0.0.0.0");

/// Directory for runtime state publication (DNS/proxy settings document)
pub const STATE_DIR: &str = "/run/tunneld";

/// Capacity of the bounded queue between the read loop and engine
/// submission. When full, the newest packet is dropped.
pub const SUBMIT_QUEUE_CAPACITY: usize = 512;

/// Capacity of the channel carrying engine output back to the interface
pub const OUTBOUND_QUEUE_CAPACITY: usize = 512;

/// Maximum packets drained from the interface in one read batch
pub const READ_BATCH_MAX: usize = 32;

/// Address family tag attached to packets written back to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Derives the family from the version nibble of a raw IP packet.
    ///
    /// A payload that is neither v4 nor v6 (or is empty) is tagged IPv4,
    /// the fallback designation for unrecognized traffic.
    pub fn from_packet(packet: &[u8]) -> Self {
        match packet.first().map(|b| b >> 4) {
            Some(4) => AddressFamily::Ipv4,
            Some(6) => AddressFamily::Ipv6,
            _ => AddressFamily::Ipv4,
        }
    }
}

/// Reason passed to `stop_tunnel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The controlling process requested a stop.
    Requested,
    /// The provider is being superseded by a new configuration.
    Superseded,
    /// The provider is shutting down because of an internal failure.
    Failure,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::Superseded => write!(f, "superseded"),
            StopReason::Failure => write!(f, "failure"),
        }
    }
}

/// Tunnel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Absorbing state entered when startup validation or the engine fails.
    Failed,
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TunnelState::Idle => "idle",
            TunnelState::Starting => "starting",
            TunnelState::Running => "running",
            TunnelState::Stopping => "stopping",
            TunnelState::Stopped => "stopped",
            TunnelState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}
