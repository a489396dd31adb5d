//! VPN consent
//!
//! Bringing tunnels up needs network administration rights. When the daemon
//! lacks them, a remote `set_tunnel` launches the consent interstitial (by
//! default `atcli ui --prepare`) instead of failing outright.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AutoTunnelError, AutoTunnelResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VpnConsent: Send + Sync {
    /// Whether the process may bring tunnels up
    async fn is_granted(&self) -> bool;

    /// Show the consent interstitial; returns once it has been launched
    async fn launch_consent_ui(&self) -> AutoTunnelResult<()>;
}

/// Consent backed by the effective user id
pub struct PrivilegeConsent {
    command: Vec<String>,
}

impl PrivilegeConsent {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl VpnConsent for PrivilegeConsent {
    async fn is_granted(&self) -> bool {
        #[cfg(unix)]
        {
            unsafe { libc::geteuid() == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    async fn launch_consent_ui(&self) -> AutoTunnelResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| AutoTunnelError::Service("No consent command configured".to_string()))?;

        info!("Launching VPN consent UI: {}", self.command.join(" "));
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| AutoTunnelError::Service(format!("Failed to launch {}: {}", program, e)))?;
        debug!("Consent UI running as pid {:?}", child.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let consent = PrivilegeConsent::new(Vec::new());
        let err = consent.launch_consent_ui().await.unwrap_err();
        assert!(matches!(err, AutoTunnelError::Service(_)));
    }

    #[tokio::test]
    async fn test_launch_does_not_wait_for_exit() {
        let consent = PrivilegeConsent::new(vec!["sleep".to_string(), "5".to_string()]);
        tokio::time::timeout(std::time::Duration::from_secs(2), consent.launch_consent_ui())
            .await
            .expect("launch must not block")
            .unwrap();
    }
}
