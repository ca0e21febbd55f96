//! Settings application to the OS.
//!
//! [`SettingsHost`] is the seam through which derived [`NetworkSettings`]
//! reach the operating system. The production implementation configures
//! the interface with `ip` commands and publishes the DNS/proxy portion
//! as a JSON state document for resolver/proxy tooling to pick up.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;
use tunnel_common::{shell, TunnelError};

use crate::commands::{
    build_add_address_cmd, build_add_route_cmd, build_exclude_route_cmd, build_link_up_cmd,
    build_set_mtu_cmd,
};
use crate::settings::NetworkSettings;
use crate::types::STATE_DIR;

/// Applies derived network settings to the OS.
#[async_trait]
pub trait SettingsHost: Send + Sync {
    /// Applies the settings. The verdict is surfaced once through tunnel
    /// startup; a rejection does not keep the pump from starting.
    async fn apply(&self, settings: &NetworkSettings) -> Result<(), TunnelError>;
}

/// Settings host that configures the interface through the `ip` tool.
pub struct ShellSettingsHost {
    interface: String,
    state_dir: PathBuf,
}

impl ShellSettingsHost {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            state_dir: PathBuf::from(STATE_DIR),
        }
    }

    /// Overrides the state publication directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Commands applying the address pair, MTU, link state, and routes.
    fn build_commands(&self, settings: &NetworkSettings) -> Vec<String> {
        let mut cmds = Vec::new();
        for (address, mask) in &settings.addresses {
            cmds.push(build_add_address_cmd(address, mask, &self.interface));
        }
        cmds.push(build_set_mtu_cmd(&self.interface, settings.mtu));
        cmds.push(build_link_up_cmd(&self.interface));
        for route in &settings.included_routes {
            cmds.push(build_add_route_cmd(route, &self.interface));
        }
        for route in &settings.excluded_routes {
            cmds.push(build_exclude_route_cmd(route));
        }
        cmds
    }

    /// Writes the full derived settings (including DNS and proxy state,
    /// which have no `ip` representation) under the state directory.
    async fn publish_state(&self, settings: &NetworkSettings) -> Result<(), TunnelError> {
        let path = self.state_dir.join("settings.json");
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| TunnelError::internal(format!("settings serialization: {e}")))?;

        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| TunnelError::StateWrite {
                path: self.state_dir.clone(),
                source: e,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| TunnelError::StateWrite { path, source: e })
    }
}

#[async_trait]
impl SettingsHost for ShellSettingsHost {
    async fn apply(&self, settings: &NetworkSettings) -> Result<(), TunnelError> {
        for cmd in self.build_commands(settings) {
            shell::exec_or_throw(&cmd).await?;
        }
        self.publish_state(settings).await?;
        info!(
            interface = %self.interface,
            remote = %settings.remote_address,
            included = settings.included_routes.len(),
            excluded = settings.excluded_routes.len(),
            dns = settings.dns_servers.len(),
            "network settings applied"
        );
        Ok(())
    }
}
