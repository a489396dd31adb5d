//! Error types for autotunnel

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoTunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Malformed tunnel configuration text
    #[error("Parse error: {0}")]
    Parse(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Tunnel lookup by name failed
    #[error("No such tunnel: {0}")]
    TunnelNotFound(String),
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Observed state has not produced a value yet
    #[error("Not ready: {0}")]
    NotReady(String),
    /// Repository read/write failed
    #[error("Storage error: {0}")]
    Storage(String),
    /// Tunnel engine failure
    #[error("Tunnel engine error: {0}")]
    Engine(String),
    /// Service error (watcher, consent launcher)
    #[error("Service error: {0}")]
    Service(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// D-Bus error
    #[error("D-Bus error: {0}")]
    Dbus(String),
    /// Permission denied
    #[error("Permission denied: {0}")]
    Permission(String),
    /// A request handler panicked
    #[error("Request handler panicked: {0}")]
    Panicked(String),
}

impl From<serde_json::Error> for AutoTunnelError {
    fn from(error: serde_json::Error) -> Self {
        AutoTunnelError::Storage(error.to_string())
    }
}

impl From<toml::de::Error> for AutoTunnelError {
    fn from(error: toml::de::Error) -> Self {
        AutoTunnelError::Config(error.to_string())
    }
}

impl From<zbus::Error> for AutoTunnelError {
    fn from(error: zbus::Error) -> Self {
        AutoTunnelError::Dbus(error.to_string())
    }
}

impl From<zbus::fdo::Error> for AutoTunnelError {
    fn from(error: zbus::fdo::Error) -> Self {
        AutoTunnelError::Dbus(error.to_string())
    }
}

pub type AutoTunnelResult<T> = Result<T, AutoTunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_not_found_message() {
        let err = AutoTunnelError::TunnelNotFound("office".to_string());
        assert_eq!(err.to_string(), "No such tunnel: office");
    }

    #[test]
    fn test_json_error_maps_to_storage() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: AutoTunnelError = json_err.into();
        assert!(matches!(err, AutoTunnelError::Storage(_)));
    }
}
