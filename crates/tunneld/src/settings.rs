//! Network settings derivation.
//!
//! [`build_network_settings`] is a pure transformation from a decoded
//! [`TunnelMessage`] to the interface configuration applied to the OS.
//! It performs no I/O and has no failure path: route entries are mapped
//! structurally, and syntactically invalid addresses or masks pass through
//! unchanged for the OS to reject at apply time.

use serde::Serialize;

use crate::message::TunnelMessage;
use crate::types::{DEFAULT_ROUTE, TUNNEL_ADDRESSES, TUNNEL_MTU};

/// A single route entry: destination address plus subnet mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: String,
    pub mask: String,
}

impl Route {
    /// Structural 1:1 mapping from an (address, mask) pair.
    pub fn from_pair(pair: &(String, String)) -> Self {
        Self {
            destination: pair.0.clone(),
            mask: pair.1.clone(),
        }
    }

    /// The route-everything entry.
    pub fn default_route() -> Self {
        Self {
            destination: DEFAULT_ROUTE.0.to_string(),
            mask: DEFAULT_ROUTE.1.to_string(),
        }
    }
}

/// Proxy configuration block. HTTP/HTTPS proxying and automatic proxy
/// configuration are always enabled; only the domain lists vary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySettings {
    pub http_enabled: bool,
    pub https_enabled: bool,
    pub auto_config_enabled: bool,
    pub exception_list: Vec<String>,
    pub match_domains: Vec<String>,
}

/// Derived interface configuration, consumed once per startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSettings {
    /// Tunnel remote endpoint.
    pub remote_address: String,
    /// Local address pair applied to the interface, as (address, mask).
    pub addresses: Vec<(String, String)>,
    /// Interface MTU.
    pub mtu: u16,
    /// Routes carried through the tunnel.
    pub included_routes: Vec<Route>,
    /// Routes kept off the tunnel.
    pub excluded_routes: Vec<Route>,
    /// DNS servers, in configuration order.
    pub dns_servers: Vec<String>,
    /// Proxy configuration.
    pub proxy: ProxySettings,
}

/// Derives [`NetworkSettings`] from a configuration message.
///
/// The caller has already established that the message carries a server
/// address; everything else defaults. An empty included-route list becomes
/// exactly one route-everything entry so a tunnel with no explicit
/// inclusions still carries all traffic.
pub fn build_network_settings(server_address: &str, message: &TunnelMessage) -> NetworkSettings {
    let included_routes = if message.ipv4_included_routes.is_empty() {
        vec![Route::default_route()]
    } else {
        message
            .ipv4_included_routes
            .iter()
            .map(Route::from_pair)
            .collect()
    };

    let excluded_routes = message
        .ipv4_excluded_routes
        .iter()
        .map(Route::from_pair)
        .collect();

    NetworkSettings {
        remote_address: server_address.to_string(),
        addresses: TUNNEL_ADDRESSES
            .iter()
            .map(|(a, m)| (a.to_string(), m.to_string()))
            .collect(),
        mtu: TUNNEL_MTU,
        included_routes,
        excluded_routes,
        dns_servers: message.dns_servers.clone(),
        proxy: ProxySettings {
            http_enabled: true,
            https_enabled: true,
            auto_config_enabled: true,
            exception_list: message.proxy_exception_list.clone(),
            match_domains: message.proxy_match_domains.clone(),
        },
    }
}
