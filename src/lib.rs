//! autotunnel - WireGuard auto-tunnel control library
//!
//! Remote control of tunnels and auto-tunnel triggers:
//! - Settings and tunnel repositories (JSON state file)
//! - wg-quick configuration parsing and a wg-quick tunnel engine
//! - Auto-tunnel watcher driven by link state
//! - Remote control façade exported on D-Bus, plus a client
//! - Terminal shell with navigation, permission gate and VPN consent notice

pub mod error;
pub mod config;
pub mod logging;
pub mod settings;
pub mod tunnel;
pub mod repository;
pub mod lifecycle;
pub mod state;
pub mod consent;
pub mod service;
pub mod remote;
pub mod shell;

// Re-export commonly used types
pub use error::{AutoTunnelError, AutoTunnelResult};
pub use config::{AutoTunnelConfig, BusKind};
pub use settings::{AppSettings, SettingToggle};
pub use tunnel::{TunnelConf, TunnelEngine, WgQuickConfig, WgQuickEngine};
pub use repository::{AppDataRepository, JsonStateStore, SettingsRepository, TunnelRepository};
pub use lifecycle::LifecycleScope;
pub use state::ObservedState;
pub use consent::{PrivilegeConsent, VpnConsent};
pub use service::{AutoTunnelService, ServiceManager};
pub use remote::{RemoteCallback, RemoteClient, RemoteControl, RemoteControlDeps, TunnelNameCallback};
pub use shell::{Shell, ShellDeps};
