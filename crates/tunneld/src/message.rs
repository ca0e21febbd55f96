//! Tunnel configuration message model.
//!
//! The controlling process delivers configuration as a JSON document.
//! Recognized fields are decoded into [`TunnelMessage`]; unknown fields are
//! ignored and missing optional fields take empty defaults. The message is
//! immutable once decoded.

use serde::Deserialize;

/// A tunnel configuration message from the controlling process.
///
/// `config_data` is an opaque payload forwarded verbatim to the engine; it
/// is never parsed here beyond existence checks. On the wire it is carried
/// base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TunnelMessage {
    /// Opaque engine configuration payload (base64 on the wire).
    #[serde(rename = "configData", with = "base64_opt")]
    pub config_data: Option<Vec<u8>>,

    /// Tunnel remote endpoint address.
    #[serde(rename = "serverIP")]
    pub server_ip: Option<String>,

    /// DNS servers for the tunnel interface, in order.
    #[serde(rename = "dnsServers")]
    pub dns_servers: Vec<String>,

    /// Routes carried through the tunnel, as (address, mask) pairs.
    #[serde(rename = "ipv4IncludedRoutes")]
    pub ipv4_included_routes: Vec<(String, String)>,

    /// Routes kept off the tunnel, as (address, mask) pairs.
    #[serde(rename = "ipv4ExcludedRoutes")]
    pub ipv4_excluded_routes: Vec<(String, String)>,

    /// Domains excluded from proxying.
    #[serde(rename = "proxyExceptionList")]
    pub proxy_exception_list: Vec<String>,

    /// Domains the proxy rule applies to.
    #[serde(rename = "proxyMatchDomains")]
    pub proxy_match_domains: Vec<String>,
}

impl TunnelMessage {
    /// Decodes a message from its JSON wire form.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Returns the engine payload if present and non-empty.
    pub fn engine_config(&self) -> Option<&[u8]> {
        match &self.config_data {
            Some(data) if !data.is_empty() => Some(data),
            _ => None,
        }
    }

    /// Returns the server address if present and non-empty.
    pub fn server_address(&self) -> Option<&str> {
        match self.server_ip.as_deref() {
            Some(ip) if !ip.is_empty() => Some(ip),
            _ => None,
        }
    }
}

/// Serde adapter for an optional base64-encoded byte field.
mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
