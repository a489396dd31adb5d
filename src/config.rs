//! Configuration management for autotunnel

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{AutoTunnelError, AutoTunnelResult};

/// Default location of the daemon configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/autotunnel/autotunnel.toml";

/// Main autotunnel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoTunnelConfig {
    /// Filesystem locations
    #[serde(default)]
    pub paths: ConfigPaths,
    /// Remote control (D-Bus) settings
    #[serde(default)]
    pub remote: RemoteSettings,
    /// Observed state sharing policy
    #[serde(default)]
    pub state: StateSettings,
    /// Auto-tunnel watcher settings
    #[serde(default)]
    pub watcher: WatcherSettings,
    /// VPN consent flow
    #[serde(default)]
    pub consent: ConsentSettings,
    /// Terminal shell
    #[serde(default)]
    pub shell: ShellSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPaths {
    /// Persistent data directory (settings and tunnel store)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Runtime directory for generated wg-quick files
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
}

/// Which message bus the remote control interface lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_bus")]
    pub bus: BusKind,
    /// Well-known D-Bus name requested by the daemon
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    /// How long observed streams stay live after the last subscriber detaches
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSettings {
    /// Interval between link snapshots
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Root of the sysfs network class directory
    #[serde(default = "default_sysfs_net")]
    pub sysfs_net: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSettings {
    /// Command spawned to show the VPN consent interstitial
    #[serde(default = "default_consent_command")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSettings {
    /// Deep link opened by the permission recovery screen
    #[serde(default = "default_settings_uri")]
    pub settings_uri: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/autotunnel")
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("/run/autotunnel")
}

fn default_bus() -> BusKind {
    BusKind::System
}

fn default_service_name() -> String {
    crate::remote::AUTOTUNNEL_DBUS_SERVICE.to_string()
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_sysfs_net() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_consent_command() -> Vec<String> {
    vec!["atcli".to_string(), "ui".to_string(), "--prepare".to_string()]
}

fn default_settings_uri() -> String {
    "settings://autotunnel".to_string()
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            runtime_dir: default_runtime_dir(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            service_name: default_service_name(),
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            sysfs_net: default_sysfs_net(),
        }
    }
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            command: default_consent_command(),
        }
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            settings_uri: default_settings_uri(),
        }
    }
}

impl StateSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl WatcherSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl AutoTunnelConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> AutoTunnelResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AutoTunnelError::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AutoTunnelError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AutoTunnelResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> AutoTunnelResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AutoTunnelError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| AutoTunnelError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> AutoTunnelResult<()> {
        for dir in [&self.paths.data_dir, &self.paths.runtime_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| AutoTunnelError::Config(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }

    /// Path of the persisted settings and tunnel store
    pub fn state_file(&self) -> PathBuf {
        self.paths.data_dir.join("state.json")
    }
}
