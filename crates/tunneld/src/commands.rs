//! Shell command builders for tunnel interface configuration

use tunnel_common::shell;

use crate::settings::Route;

/// Renders an (address, mask) pair in CIDR form for the `ip` tool.
///
/// A contiguous dotted-quad mask becomes a prefix length; anything else is
/// passed through verbatim and left for the OS to reject.
fn render_cidr(destination: &str, mask: &str) -> String {
    match mask_prefix_len(mask) {
        Some(len) => format!("{}/{}", destination, len),
        None => format!("{}/{}", destination, mask),
    }
}

/// Returns the prefix length for a contiguous dotted-quad mask.
fn mask_prefix_len(mask: &str) -> Option<u8> {
    let addr: std::net::Ipv4Addr = mask.parse().ok()?;
    let bits = u32::from(addr);
    if bits == 0 {
        return Some(0);
    }
    let len = bits.leading_ones();
    // Reject non-contiguous masks like 255.0.255.0
    if bits == u32::MAX << (32 - len) {
        Some(len as u8)
    } else {
        None
    }
}

/// Build interface address assignment command
pub fn build_add_address_cmd(address: &str, mask: &str, interface: &str) -> String {
    format!(
        "{} addr add {} dev {}",
        shell::IP_CMD,
        shell::shellquote(&render_cidr(address, mask)),
        shell::shellquote(interface)
    )
}

/// Build interface MTU assignment command
pub fn build_set_mtu_cmd(interface: &str, mtu: u16) -> String {
    format!(
        "{} link set dev {} mtu {}",
        shell::IP_CMD,
        shell::shellquote(interface),
        mtu
    )
}

/// Build interface bring-up command
pub fn build_link_up_cmd(interface: &str) -> String {
    format!(
        "{} link set dev {} up",
        shell::IP_CMD,
        shell::shellquote(interface)
    )
}

/// Build included-route command
///
/// Routes traffic for the destination through the tunnel interface.
/// Uses 'replace' to handle existing routes gracefully.
pub fn build_add_route_cmd(route: &Route, interface: &str) -> String {
    format!(
        "{} route replace {} dev {}",
        shell::IP_CMD,
        shell::shellquote(&render_cidr(&route.destination, &route.mask)),
        shell::shellquote(interface)
    )
}

/// Build excluded-route command
///
/// A `throw` route terminates lookup for the destination in the current
/// table, keeping the prefix off the tunnel's route-everything entry.
pub fn build_exclude_route_cmd(route: &Route) -> String {
    format!(
        "{} route replace throw {}",
        shell::IP_CMD,
        shell::shellquote(&render_cidr(&route.destination, &route.mask)),
    )
}
