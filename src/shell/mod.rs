//! Terminal shell
//!
//! [`Shell`] is the composition root of the interactive side: it initializes
//! the preference store before the first frame, applies the notification
//! permission gate, shows the VPN consent interstitial when launched with
//! `prepare`, and routes between the four destinations.

pub mod navigation;
pub mod permission;
pub mod screens;
pub mod snackbar;

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::consent::VpnConsent;
use crate::error::AutoTunnelResult;
use crate::repository::{AppDataRepository, PreferencesStore};

pub use navigation::{resolve, Destination, Navigator, Screen, BOTTOM_BAR, START_DESTINATION};
pub use permission::{NotificationPermission, PermissionController, PermissionStatus};
pub use snackbar::{SnackbarHost, SnackbarMessage, SnackbarQueue};

const CONSENT_NOTICE: &str = "Tunnels need network administration rights. \
Run autotunneld as root or grant it CAP_NET_ADMIN, then retry.";

/// Which element currently has input focus; shared by every screen
#[derive(Debug, Clone, Default)]
pub struct FocusHandle {
    target: Arc<Mutex<Option<String>>>,
}

impl FocusHandle {
    pub fn request(&self, target: impl Into<String>) {
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = Some(target.into());
    }

    pub fn clear(&self) {
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn current(&self) -> Option<String> {
        self.target.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// One rendered frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Notification permission denied: nothing else is shown
    PermissionRequired { settings_uri: String },
    Content {
        /// One-off notice shown above the content
        notice: Option<String>,
        bottom_bar: Vec<Screen>,
        /// `None` renders nothing
        destination: Option<Destination>,
        body: String,
    },
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::PermissionRequired { settings_uri } => {
                writeln!(f, "Notifications are required to report tunnel status.")?;
                writeln!(f, "[Request permission again]")?;
                writeln!(f, "Open settings: {}", settings_uri)
            }
            Frame::Content {
                notice,
                bottom_bar,
                destination,
                body,
            } => {
                if let Some(notice) = notice {
                    writeln!(f, "! {}", notice)?;
                    writeln!(f)?;
                }
                if let Some(destination) = destination {
                    writeln!(f, "== {} ==", destination.screen().label())?;
                    write!(f, "{}", body)?;
                }
                let items: Vec<&str> = bottom_bar.iter().map(|s| s.label()).collect();
                writeln!(f, "\n[{}]", items.join(" | "))
            }
        }
    }
}

/// Collaborators of the shell
pub struct ShellDeps {
    pub preferences: Arc<dyn PreferencesStore>,
    pub repo: AppDataRepository,
    pub permission: Arc<dyn PermissionController>,
    pub consent: Arc<dyn VpnConsent>,
    pub settings_uri: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchOptions {
    /// Run the VPN consent flow before routing
    pub prepare: bool,
}

pub struct Shell {
    repo: AppDataRepository,
    permission: Arc<dyn PermissionController>,
    settings_uri: String,
    /// `None` when the platform has no runtime permission to ask for
    permission_state: Option<PermissionStatus>,
    consent_notice: Option<String>,
    navigator: Navigator,
    snackbar: SnackbarHost,
    snackbar_queue: SnackbarQueue,
    focus: FocusHandle,
}

impl Shell {
    pub async fn start(deps: ShellDeps, options: LaunchOptions) -> Self {
        if let Err(e) = deps.preferences.init().await {
            error!("Failed to load preferences: {}", e);
        }

        let permission_state = if deps.permission.requires_runtime_request() {
            let status = match deps.permission.status().await {
                PermissionStatus::Granted => PermissionStatus::Granted,
                PermissionStatus::Denied => deps.permission.request().await,
            };
            Some(status)
        } else {
            None
        };

        let consent_notice = if options.prepare && !deps.consent.is_granted().await {
            info!("VPN consent not granted");
            Some(CONSENT_NOTICE.to_string())
        } else {
            None
        };

        let (snackbar, snackbar_queue) = SnackbarHost::channel();
        Self {
            repo: deps.repo,
            permission: deps.permission,
            settings_uri: deps.settings_uri,
            permission_state,
            consent_notice,
            navigator: Navigator::new(),
            snackbar,
            snackbar_queue,
            focus: FocusHandle::default(),
        }
    }

    pub fn permission_state(&self) -> Option<PermissionStatus> {
        self.permission_state
    }

    /// The "request permission again" action
    pub async fn retry_permission(&mut self) -> PermissionStatus {
        let status = self.permission.request().await;
        if self.permission_state.is_some() {
            self.permission_state = Some(status);
        }
        status
    }

    fn permission_denied(&self) -> bool {
        self.permission_state == Some(PermissionStatus::Denied)
    }

    pub fn current_route(&self) -> &str {
        self.navigator.current()
    }

    /// Render the current route
    pub async fn render(&mut self) -> AutoTunnelResult<Frame> {
        let route = self.navigator.current().to_string();
        self.navigate(&route).await
    }

    /// Navigate to `route` and render it
    pub async fn navigate(&mut self, route: &str) -> AutoTunnelResult<Frame> {
        if self.permission_denied() {
            return Ok(Frame::PermissionRequired {
                settings_uri: self.settings_uri.clone(),
            });
        }

        let destination = self.navigator.navigate(route)?;
        let body = match &destination {
            Some(destination) => {
                let ctx = screens::ScreenContext {
                    repo: &self.repo,
                    snackbar: &self.snackbar,
                    focus: &self.focus,
                };
                screens::render(&ctx, destination).await?
            }
            None => String::new(),
        };

        Ok(Frame::Content {
            notice: self.consent_notice.take(),
            bottom_bar: BOTTOM_BAR.to_vec(),
            destination,
            body,
        })
    }

    pub fn pop_back(&mut self) -> bool {
        self.navigator.pop_back()
    }

    pub fn snackbar(&self) -> SnackbarHost {
        self.snackbar.clone()
    }

    /// Messages posted since the last call
    pub fn drain_snackbars(&mut self) -> Vec<SnackbarMessage> {
        self.snackbar_queue.drain()
    }

    pub fn focus(&self) -> FocusHandle {
        self.focus.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::permission::MockPermissionController;
    use super::*;
    use crate::consent::MockVpnConsent;
    use crate::repository::JsonStateStore;
    use tempfile::TempDir;

    fn deps(store: Arc<JsonStateStore>, permission: MockPermissionController, consent: MockVpnConsent) -> ShellDeps {
        ShellDeps {
            preferences: store.clone(),
            repo: AppDataRepository::from_store(store),
            permission: Arc::new(permission),
            consent: Arc::new(consent),
            settings_uri: "settings://autotunnel".to_string(),
        }
    }

    fn no_gate() -> MockPermissionController {
        let mut permission = MockPermissionController::new();
        permission.expect_requires_runtime_request().return_const(false);
        permission
    }

    #[tokio::test]
    async fn test_start_destination_is_main() {
        let store = Arc::new(JsonStateStore::in_memory());
        let mut shell = Shell::start(deps(store, no_gate(), MockVpnConsent::new()), LaunchOptions::default()).await;
        assert_eq!(shell.permission_state(), None);

        match shell.render().await.unwrap() {
            Frame::Content {
                destination,
                bottom_bar,
                notice,
                ..
            } => {
                assert_eq!(destination, Some(Destination::Main));
                assert_eq!(bottom_bar, vec![Screen::Main, Screen::Settings, Screen::Support]);
                assert_eq!(notice, None);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_denied_permission_hides_navigation() {
        let mut permission = MockPermissionController::new();
        permission.expect_requires_runtime_request().return_const(true);
        permission.expect_status().returning(|| PermissionStatus::Denied);
        permission.expect_request().returning(|| PermissionStatus::Denied);

        let store = Arc::new(JsonStateStore::in_memory());
        let mut shell = Shell::start(deps(store, permission, MockVpnConsent::new()), LaunchOptions::default()).await;
        assert_eq!(shell.permission_state(), Some(PermissionStatus::Denied));

        let frame = shell.navigate("settings").await.unwrap();
        assert_eq!(
            frame,
            Frame::PermissionRequired {
                settings_uri: "settings://autotunnel".to_string()
            }
        );
        assert!(frame.to_string().contains("settings://autotunnel"));
    }

    #[tokio::test]
    async fn test_prepare_shows_consent_notice_once() {
        let mut consent = MockVpnConsent::new();
        consent.expect_is_granted().returning(|| false);

        let store = Arc::new(JsonStateStore::in_memory());
        let mut shell = Shell::start(deps(store, no_gate(), consent), LaunchOptions { prepare: true }).await;

        let first = shell.render().await.unwrap();
        assert!(first.to_string().contains("CAP_NET_ADMIN"));
        let second = shell.render().await.unwrap();
        assert!(!second.to_string().contains("CAP_NET_ADMIN"));
    }

    #[tokio::test]
    async fn test_blank_config_renders_nothing() {
        let store = Arc::new(JsonStateStore::in_memory());
        let mut shell = Shell::start(deps(store, no_gate(), MockVpnConsent::new()), LaunchOptions::default()).await;

        match shell.navigate("config/  ").await.unwrap() {
            Frame::Content { destination, body, .. } => {
                assert_eq!(destination, None);
                assert!(body.is_empty());
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(shell.navigate("nowhere").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_preference_init_still_renders() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = Arc::new(JsonStateStore::new(path));

        let mut shell = Shell::start(deps(store, no_gate(), MockVpnConsent::new()), LaunchOptions::default()).await;
        assert!(shell.navigate("settings").await.is_ok());
    }
}
