//! Process-wide application settings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application settings record
///
/// Only ever replaced as a whole: callers derive a changed copy inside
/// [`crate::repository::SettingsRepository::update`], which reads and saves
/// under the store lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Auto-tunnel watcher is running
    pub is_auto_tunnel_enabled: bool,
    pub is_tunnel_on_mobile_data_enabled: bool,
    /// Tunnel on Wi-Fi networks that are not trusted
    pub is_tunnel_on_wifi_enabled: bool,
    pub is_tunnel_on_ethernet_enabled: bool,
    pub is_stop_on_no_internet_enabled: bool,
    /// Restore the last tunnel state after boot
    pub is_restore_on_boot_enabled: bool,
    pub trusted_network_ssids: Vec<String>,
}

/// The boolean trigger flags a remote caller may flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingToggle {
    MobileData,
    UntrustedWifi,
    Ethernet,
    StopOnNoInternet,
    RestoreOnBoot,
}

impl SettingToggle {
    pub const ALL: [SettingToggle; 5] = [
        SettingToggle::MobileData,
        SettingToggle::UntrustedWifi,
        SettingToggle::Ethernet,
        SettingToggle::StopOnNoInternet,
        SettingToggle::RestoreOnBoot,
    ];

    /// Name of the remote operation that flips this flag
    pub fn operation(self) -> &'static str {
        match self {
            SettingToggle::MobileData => "tunnel_on_mobile_data",
            SettingToggle::UntrustedWifi => "tunnel_on_untrusted_wifi",
            SettingToggle::Ethernet => "tunnel_on_ethernet",
            SettingToggle::StopOnNoInternet => "stop_on_no_internet",
            SettingToggle::RestoreOnBoot => "start_tunnel_on_boot",
        }
    }

    /// Read the flag from a settings record
    pub fn get(self, settings: &AppSettings) -> bool {
        match self {
            SettingToggle::MobileData => settings.is_tunnel_on_mobile_data_enabled,
            SettingToggle::UntrustedWifi => settings.is_tunnel_on_wifi_enabled,
            SettingToggle::Ethernet => settings.is_tunnel_on_ethernet_enabled,
            SettingToggle::StopOnNoInternet => settings.is_stop_on_no_internet_enabled,
            SettingToggle::RestoreOnBoot => settings.is_restore_on_boot_enabled,
        }
    }
}

impl fmt::Display for SettingToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingToggle::MobileData => "tunnel-on-mobile-data",
            SettingToggle::UntrustedWifi => "tunnel-on-untrusted-wifi",
            SettingToggle::Ethernet => "tunnel-on-ethernet",
            SettingToggle::StopOnNoInternet => "stop-on-no-internet",
            SettingToggle::RestoreOnBoot => "restore-on-boot",
        };
        f.write_str(name)
    }
}

impl AppSettings {
    /// Copy of this record with exactly one flag changed
    pub fn with_toggle(&self, toggle: SettingToggle, enabled: bool) -> Self {
        let mut next = self.clone();
        match toggle {
            SettingToggle::MobileData => next.is_tunnel_on_mobile_data_enabled = enabled,
            SettingToggle::UntrustedWifi => next.is_tunnel_on_wifi_enabled = enabled,
            SettingToggle::Ethernet => next.is_tunnel_on_ethernet_enabled = enabled,
            SettingToggle::StopOnNoInternet => next.is_stop_on_no_internet_enabled = enabled,
            SettingToggle::RestoreOnBoot => next.is_restore_on_boot_enabled = enabled,
        }
        next
    }

    pub fn with_auto_tunnel(&self, enabled: bool) -> Self {
        Self {
            is_auto_tunnel_enabled: enabled,
            ..self.clone()
        }
    }
}
