//! Tunnel records and the tunnel engine seam
//!
//! A [`TunnelConf`] is a named wg-quick configuration. The [`TunnelEngine`]
//! trait is the only way the rest of the crate brings tunnels up or down; the
//! default engine shells out to `wg-quick` (see [`wireguard`]).

pub mod common;
pub mod quick;
pub mod wireguard;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AutoTunnelError, AutoTunnelResult};

pub use quick::{InterfaceSection, PeerSection, WgQuickConfig};
pub use wireguard::WgQuickEngine;

/// A named tunnel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConf {
    pub id: String,
    pub name: String,
    /// Normalized wg-quick text
    pub wg_quick: String,
    #[serde(default)]
    pub is_primary_tunnel: bool,
}

impl TunnelConf {
    /// Parse configuration text into a typed config
    pub fn config_from_quick(text: &str) -> AutoTunnelResult<WgQuickConfig> {
        WgQuickConfig::parse(text)
    }

    /// Build a new tunnel record from a parsed config
    pub fn from_quick_config(config: &WgQuickConfig, name: &str) -> AutoTunnelResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AutoTunnelError::InvalidParameter("Tunnel name cannot be empty".to_string()));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            wg_quick: config.to_quick_string(),
            is_primary_tunnel: false,
        })
    }

    /// Typed view of the stored configuration
    pub fn quick_config(&self) -> AutoTunnelResult<WgQuickConfig> {
        WgQuickConfig::parse(&self.wg_quick)
    }

    /// Kernel interface name for this tunnel (at most 15 bytes)
    pub fn interface_name(&self) -> String {
        let short: String = self.id.chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect();
        format!("wg-{}", short)
    }
}

/// Brings tunnels up and down
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Start a tunnel; starting an already running tunnel succeeds
    async fn start_tunnel(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()>;

    /// Stop a tunnel; stopping a tunnel that is not running succeeds
    async fn stop_tunnel(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()>;

    /// Ids of the tunnels currently up
    async fn active_tunnels(&self) -> Vec<String>;
}
