use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AutoTunnelError, AutoTunnelResult};
use super::common;
use super::{TunnelConf, TunnelEngine};

/// A tunnel brought up by this engine
struct ActiveTunnel {
    name: String,
    interface_name: String,
    config_path: PathBuf,
}

/// Tunnel engine driving `wg-quick`
///
/// Each started tunnel gets a 0600 config file in the runtime directory named
/// after its interface; `wg-quick` derives the interface name from the file
/// name. All state transitions go through one mutex, so a start and a stop of
/// the same tunnel never run `wg-quick` concurrently.
pub struct WgQuickEngine {
    runtime_dir: PathBuf,
    program: String,
    active: Mutex<HashMap<String, ActiveTunnel>>,
}

impl WgQuickEngine {
    /// Create a new engine writing configs into `runtime_dir`
    pub fn new(runtime_dir: PathBuf) -> Self {
        Self {
            runtime_dir,
            program: "wg-quick".to_string(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different `wg-quick` compatible binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Check if the wg-quick tooling is installed
    pub async fn is_available(&self) -> bool {
        common::check_binary_available(&self.program).await
            && common::check_binary_available("wg").await
    }

    /// Stop every tunnel this engine started
    pub async fn stop_all(&self) {
        let drained: Vec<ActiveTunnel> = {
            let mut active = self.active.lock().await;
            active.drain().map(|(_, tunnel)| tunnel).collect()
        };

        for tunnel in drained {
            if let Err(e) = self.bring_down(&tunnel).await {
                warn!("Failed to stop tunnel {}: {}", tunnel.name, e);
            }
        }
    }

    async fn bring_down(&self, tunnel: &ActiveTunnel) -> AutoTunnelResult<()> {
        info!("Stopping tunnel {} (interface: {})", tunnel.name, tunnel.interface_name);

        let path = config_path_str(&tunnel.config_path)?;
        if let Err(e) = common::run_checked(&self.program, &["down", path]).await {
            warn!("wg-quick down failed: {}", e);
        }
        common::delete_config_file(&tunnel.config_path).await
    }
}

fn config_path_str(path: &std::path::Path) -> AutoTunnelResult<&str> {
    path.to_str().ok_or_else(|| {
        AutoTunnelError::InvalidParameter("Config path contains invalid UTF-8".to_string())
    })
}

#[async_trait]
impl TunnelEngine for WgQuickEngine {
    async fn start_tunnel(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()> {
        let mut active = self.active.lock().await;
        if active.contains_key(&tunnel.id) {
            info!("Tunnel {} already running", tunnel.name);
            return Ok(());
        }

        // Re-validate: the record may predate a stricter parser
        let config = tunnel.quick_config()?;
        let interface_name = tunnel.interface_name();

        common::ensure_directory_exists(&self.runtime_dir).await?;
        let config_path = self.runtime_dir.join(format!("{}.conf", interface_name));
        common::write_secure_config(&config_path, &config.to_quick_string(), 0o600).await?;

        info!("Starting tunnel {} (interface: {})", tunnel.name, interface_name);
        let path = config_path_str(&config_path)?;
        if let Err(e) = common::run_checked(&self.program, &["up", path]).await {
            common::delete_config_file(&config_path).await.ok();
            return Err(e);
        }

        active.insert(
            tunnel.id.clone(),
            ActiveTunnel {
                name: tunnel.name.clone(),
                interface_name,
                config_path,
            },
        );
        info!("Tunnel {} is up", tunnel.name);
        Ok(())
    }

    async fn stop_tunnel(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()> {
        let mut active = self.active.lock().await;
        match active.remove(&tunnel.id) {
            Some(running) => self.bring_down(&running).await,
            None => {
                info!("Tunnel {} is not running", tunnel.name);
                Ok(())
            }
        }
    }

    async fn active_tunnels(&self) -> Vec<String> {
        self.active.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::quick::tests::SAMPLE;
    use crate::tunnel::WgQuickConfig;
    use tempfile::TempDir;

    fn office() -> TunnelConf {
        let config = WgQuickConfig::parse(SAMPLE).unwrap();
        TunnelConf::from_quick_config(&config, "office").unwrap()
    }

    #[tokio::test]
    async fn test_start_and_stop_with_stub_program() {
        let dir = TempDir::new().unwrap();
        // `true` accepts any arguments and exits 0
        let engine = WgQuickEngine::new(dir.path().to_path_buf()).with_program("true");
        let tunnel = office();

        engine.start_tunnel(&tunnel).await.unwrap();
        assert_eq!(engine.active_tunnels().await, vec![tunnel.id.clone()]);
        let conf = dir.path().join(format!("{}.conf", tunnel.interface_name()));
        assert!(conf.exists());

        // Second start is a no-op
        engine.start_tunnel(&tunnel).await.unwrap();

        engine.stop_tunnel(&tunnel).await.unwrap();
        assert!(engine.active_tunnels().await.is_empty());
        assert!(!conf.exists());
    }

    #[tokio::test]
    async fn test_failed_start_cleans_up() {
        let dir = TempDir::new().unwrap();
        let engine = WgQuickEngine::new(dir.path().to_path_buf()).with_program("false");
        let tunnel = office();

        let err = engine.start_tunnel(&tunnel).await.unwrap_err();
        assert!(matches!(err, AutoTunnelError::Engine(_)));
        assert!(engine.active_tunnels().await.is_empty());
        assert!(!dir.path().join(format!("{}.conf", tunnel.interface_name())).exists());
    }

    #[tokio::test]
    async fn test_stop_unknown_tunnel_is_ok() {
        let dir = TempDir::new().unwrap();
        let engine = WgQuickEngine::new(dir.path().to_path_buf());
        engine.stop_tunnel(&office()).await.unwrap();
    }
}
