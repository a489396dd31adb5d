//! Notification permission gate
//!
//! On a desktop session the shell needs a notification service to post
//! tunnel status. Without a session bus there is nothing to ask and no gate
//! applies.

use async_trait::async_trait;
use tracing::{debug, info};
use zbus::Connection;

use crate::error::{AutoTunnelError, AutoTunnelResult};

/// Well-known name of the desktop notification service
pub const NOTIFICATIONS_SERVICE: &str = "org.freedesktop.Notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionController: Send + Sync {
    /// Whether this platform gates the shell on a runtime permission at all
    fn requires_runtime_request(&self) -> bool;

    async fn status(&self) -> PermissionStatus;

    /// Ask for the permission and report the resulting status
    async fn request(&self) -> PermissionStatus;
}

/// Permission backed by the presence of a notification service
pub struct NotificationPermission {
    session: Option<Connection>,
}

impl NotificationPermission {
    /// Probe the session bus
    pub async fn detect() -> Self {
        match Connection::session().await {
            Ok(connection) => Self {
                session: Some(connection),
            },
            Err(e) => {
                debug!("No session bus, notification permission not required: {}", e);
                Self { session: None }
            }
        }
    }

    async fn has_notification_service(connection: &Connection) -> AutoTunnelResult<bool> {
        let proxy = zbus::fdo::DBusProxy::new(connection).await?;
        let name = NOTIFICATIONS_SERVICE
            .try_into()
            .map_err(|_| AutoTunnelError::Dbus(format!("Invalid D-Bus service name: {}", NOTIFICATIONS_SERVICE)))?;
        Ok(proxy.name_has_owner(name).await?)
    }
}

#[async_trait]
impl PermissionController for NotificationPermission {
    fn requires_runtime_request(&self) -> bool {
        self.session.is_some()
    }

    async fn status(&self) -> PermissionStatus {
        let Some(connection) = &self.session else {
            return PermissionStatus::Granted;
        };

        match Self::has_notification_service(connection).await {
            Ok(true) => PermissionStatus::Granted,
            Ok(false) => PermissionStatus::Denied,
            Err(e) => {
                debug!("Failed to query {}: {}", NOTIFICATIONS_SERVICE, e);
                PermissionStatus::Denied
            }
        }
    }

    async fn request(&self) -> PermissionStatus {
        let status = self.status().await;
        if !status.is_granted() {
            info!("{} is not available on the session bus", NOTIFICATIONS_SERVICE);
        }
        status
    }
}
