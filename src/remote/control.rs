//! The remote control façade
//!
//! Each public operation validates nothing up front: it launches its handler
//! on the façade's scope and returns. Handlers run behind the fault boundary,
//! so the caller hears back exactly once through its callback, whether the
//! handler succeeds, fails, or panics. Concurrent requests run in no
//! particular order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::boundary;
use super::callback::{RemoteCallback, TunnelListCallback, TunnelNameCallback};
use crate::consent::VpnConsent;
use crate::error::{AutoTunnelError, AutoTunnelResult};
use crate::lifecycle::LifecycleScope;
use crate::repository::AppDataRepository;
use crate::service::ServiceManager;
use crate::settings::{AppSettings, SettingToggle};
use crate::state::ObservedState;
use crate::tunnel::{TunnelConf, TunnelEngine};

/// Collaborators of [`RemoteControl`]
pub struct RemoteControlDeps {
    pub repo: AppDataRepository,
    pub engine: Arc<dyn TunnelEngine>,
    pub services: Arc<dyn ServiceManager>,
    pub consent: Arc<dyn VpnConsent>,
}

#[derive(Clone)]
pub struct RemoteControl {
    repo: AppDataRepository,
    engine: Arc<dyn TunnelEngine>,
    services: Arc<dyn ServiceManager>,
    consent: Arc<dyn VpnConsent>,
    scope: LifecycleScope,
    app_settings: ObservedState<AppSettings>,
    tunnels: ObservedState<Vec<TunnelConf>>,
    /// How long a handler waits for observed state before giving up
    ready_timeout: Duration,
}

impl RemoteControl {
    /// Create the façade. Settings and tunnels are observed on `scope` and
    /// kept for `grace` after the last request that needed them.
    pub fn new(deps: RemoteControlDeps, scope: LifecycleScope, grace: Duration) -> Self {
        let app_settings = ObservedState::state_in(
            "app settings",
            deps.repo.settings.subscribe(),
            &scope,
            grace,
        );
        let tunnels = ObservedState::state_in("tunnels", deps.repo.tunnels.subscribe(), &scope, grace);

        Self {
            repo: deps.repo,
            engine: deps.engine,
            services: deps.services,
            consent: deps.consent,
            scope,
            app_settings,
            tunnels,
            ready_timeout: grace,
        }
    }

    /// Stop accepting requests and wait for in-flight ones
    pub async fn shutdown(&self) {
        self.scope.shutdown().await;
    }

    fn dispatch<F>(&self, operation: &'static str, callback: Arc<dyn RemoteCallback>, handler: F)
    where
        F: Future<Output = AutoTunnelResult<()>> + Send + 'static,
    {
        let reporter = callback.clone();
        let launched = self.scope.launch(async move {
            let result = boundary::guard(handler).await;
            boundary::report(operation, result, reporter.as_ref());
        });

        if launched.is_none() {
            boundary::report(
                operation,
                Err(AutoTunnelError::Service("Remote control is shut down".to_string())),
                callback.as_ref(),
            );
        }
    }

    /// Parse `config` and store it as tunnel `name`
    pub fn save_tunnel(&self, name: String, config: String, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch("save_tunnel", callback, async move {
            this.handle_save_tunnel(&name, &config).await
        });
    }

    /// Delete tunnel `name`; an unknown name is not an error
    pub fn delete_tunnel(&self, name: String, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch("delete_tunnel", callback, async move {
            this.handle_delete_tunnel(&name).await
        });
    }

    /// Toggle tunnel `name` as the primary tunnel. A tunnel that already is
    /// primary clears the primary designation.
    pub fn set_as_primary_tunnel(&self, name: String, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch("set_as_primary_tunnel", callback, async move {
            this.handle_set_as_primary_tunnel(&name).await
        });
    }

    /// Start or stop tunnel `name`
    pub fn set_tunnel(&self, name: String, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch("set_tunnel", callback, async move {
            this.handle_set_tunnel(&name, enabled).await
        });
    }

    /// Start or stop the auto-tunnel watcher
    pub fn set_auto_tunnel(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch("set_auto_tunnel", callback, async move {
            this.handle_set_auto_tunnel(enabled).await
        });
    }

    pub fn set_tunnel_on_mobile_data(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        self.set_toggle(SettingToggle::MobileData, enabled, callback);
    }

    pub fn set_tunnel_on_untrusted_wifi(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        self.set_toggle(SettingToggle::UntrustedWifi, enabled, callback);
    }

    pub fn set_tunnel_on_ethernet(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        self.set_toggle(SettingToggle::Ethernet, enabled, callback);
    }

    pub fn set_stop_on_no_internet(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        self.set_toggle(SettingToggle::StopOnNoInternet, enabled, callback);
    }

    pub fn set_start_on_boot(&self, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        self.set_toggle(SettingToggle::RestoreOnBoot, enabled, callback);
    }

    /// Flip one settings flag
    pub fn set_toggle(&self, toggle: SettingToggle, enabled: bool, callback: Arc<dyn RemoteCallback>) {
        let this = self.clone();
        self.dispatch(toggle.operation(), callback, async move {
            this.handle_toggle(toggle, enabled).await
        });
    }

    /// Report the primary tunnel name. Never fails: errors report `None`.
    pub fn get_primary_tunnel_name(&self, callback: Arc<dyn TunnelNameCallback>) {
        let this = self.clone();
        let reporter = callback.clone();
        let launched = self.scope.launch(async move {
            let name = match boundary::guard(this.handle_get_primary_tunnel_name()).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("get_primary_tunnel_name failed: {}", e);
                    None
                }
            };
            boundary::notify("get_primary_tunnel_name", || reporter.on_name(name));
        });

        if launched.is_none() {
            boundary::notify("get_primary_tunnel_name", || callback.on_name(None));
        }
    }

    /// Report every stored tunnel name
    pub fn list_tunnels(&self, callback: Arc<dyn TunnelListCallback>) {
        let this = self.clone();
        let reporter = callback.clone();
        let launched = self.scope.launch(async move {
            match boundary::guard(this.handle_list_tunnels()).await {
                Ok(names) => boundary::notify("list_tunnels", || reporter.on_names(names)),
                Err(e) => {
                    warn!("list_tunnels failed: {}", e);
                    let message = e.to_string();
                    boundary::notify("list_tunnels", || reporter.on_error(Some(message)));
                }
            }
        });

        if launched.is_none() {
            boundary::notify("list_tunnels", || {
                callback.on_error(Some("Remote control is shut down".to_string()))
            });
        }
    }

    /// Wait for the observed settings to produce their first record
    async fn with_settings(&self) -> AutoTunnelResult<()> {
        let mut subscription = self.app_settings.subscribe();
        if subscription.ready(self.ready_timeout).await.is_none() {
            return Err(AutoTunnelError::NotReady("app settings".to_string()));
        }
        Ok(())
    }

    async fn find_tunnel(&self, name: &str) -> AutoTunnelResult<TunnelConf> {
        self.repo
            .tunnels
            .find_by_tunnel_name(name)
            .await?
            .ok_or_else(|| AutoTunnelError::TunnelNotFound(name.to_string()))
    }

    pub async fn handle_save_tunnel(&self, name: &str, config: &str) -> AutoTunnelResult<()> {
        let parsed = TunnelConf::config_from_quick(config)?;
        let tunnel = TunnelConf::from_quick_config(&parsed, name)?;
        info!("Saving tunnel {}", tunnel.name);
        self.repo.tunnels.save(tunnel).await
    }

    pub async fn handle_delete_tunnel(&self, name: &str) -> AutoTunnelResult<()> {
        let Some(tunnel) = self.repo.tunnels.find_by_tunnel_name(name).await? else {
            debug!("delete_tunnel: no tunnel named {}", name);
            return Ok(());
        };

        if self.engine.active_tunnels().await.contains(&tunnel.id) {
            if let Err(e) = self.engine.stop_tunnel(&tunnel).await {
                warn!("Failed to stop tunnel {} before deleting it: {}", tunnel.name, e);
            }
        }

        info!("Deleting tunnel {}", tunnel.name);
        self.repo.tunnels.delete(&tunnel).await
    }

    pub async fn handle_set_as_primary_tunnel(&self, name: &str) -> AutoTunnelResult<()> {
        let tunnel = self.find_tunnel(name).await?;
        if tunnel.is_primary_tunnel {
            info!("Clearing primary tunnel {}", tunnel.name);
            self.repo.tunnels.update_primary_tunnel(None).await
        } else {
            info!("Setting {} as primary tunnel", tunnel.name);
            self.repo.tunnels.update_primary_tunnel(Some(&tunnel)).await
        }
    }

    pub async fn handle_set_tunnel(&self, name: &str, enabled: bool) -> AutoTunnelResult<()> {
        if !self.consent.is_granted().await {
            info!("VPN consent missing, launching consent UI");
            self.consent.launch_consent_ui().await?;
        }

        let tunnel = self.find_tunnel(name).await?;
        self.with_settings().await?;

        if enabled {
            info!("Starting tunnel {}", tunnel.name);
            self.engine.start_tunnel(&tunnel).await
        } else {
            info!("Stopping tunnel {}", tunnel.name);
            self.engine.stop_tunnel(&tunnel).await
        }
    }

    pub async fn handle_set_auto_tunnel(&self, enabled: bool) -> AutoTunnelResult<()> {
        if enabled {
            self.services.start_auto_tunnel(false).await
        } else {
            self.services.stop_auto_tunnel().await
        }
    }

    pub async fn handle_toggle(&self, toggle: SettingToggle, enabled: bool) -> AutoTunnelResult<()> {
        self.with_settings().await?;
        info!("Setting {} to {}", toggle, enabled);
        self.repo
            .settings
            .update(Box::new(move |settings: AppSettings| settings.with_toggle(toggle, enabled)))
            .await?;
        Ok(())
    }

    pub async fn handle_get_primary_tunnel_name(&self) -> AutoTunnelResult<Option<String>> {
        Ok(self
            .repo
            .tunnels
            .find_primary()
            .await?
            .into_iter()
            .next()
            .map(|tunnel| tunnel.name))
    }

    pub async fn handle_list_tunnels(&self) -> AutoTunnelResult<Vec<String>> {
        let mut subscription = self.tunnels.subscribe();
        let tunnels = subscription
            .ready(self.ready_timeout)
            .await
            .ok_or_else(|| AutoTunnelError::NotReady("tunnels".to_string()))?;
        Ok(tunnels.into_iter().map(|tunnel| tunnel.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::MockVpnConsent;
    use crate::remote::callback::{CallbackOutcome, ChannelCallback, ChannelNameCallback};
    use crate::repository::JsonStateStore;
    use crate::service::MockServiceManager;
    use crate::tunnel::{quick, MockTunnelEngine};

    fn control(engine: MockTunnelEngine, services: MockServiceManager, consent: MockVpnConsent) -> RemoteControl {
        let repo = AppDataRepository::from_store(Arc::new(JsonStateStore::in_memory()));
        RemoteControl::new(
            RemoteControlDeps {
                repo,
                engine: Arc::new(engine),
                services: Arc::new(services),
                consent: Arc::new(consent),
            },
            LifecycleScope::new("remote-test"),
            Duration::from_millis(500),
        )
    }

    fn granted() -> MockVpnConsent {
        let mut consent = MockVpnConsent::new();
        consent.expect_is_granted().returning(|| true);
        consent
    }

    async fn outcome(f: impl FnOnce(Arc<dyn RemoteCallback>)) -> CallbackOutcome {
        let (callback, rx) = ChannelCallback::new();
        f(Arc::new(callback));
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_set_tunnel_starts_engine() {
        let mut engine = MockTunnelEngine::new();
        engine
            .expect_start_tunnel()
            .withf(|tunnel| tunnel.name == "office")
            .times(1)
            .returning(|_| Ok(()));
        let control = control(engine, MockServiceManager::new(), granted());

        let save = outcome(|cb| {
            control.save_tunnel("office".to_string(), quick::tests::SAMPLE.to_string(), cb)
        })
        .await;
        assert!(save.is_success());

        let result = outcome(|cb| control.set_tunnel("office".to_string(), true, cb)).await;
        assert_eq!(result, CallbackOutcome::Success);
    }

    #[tokio::test]
    async fn test_set_tunnel_launches_consent_when_missing() {
        let mut consent = MockVpnConsent::new();
        consent.expect_is_granted().returning(|| false);
        consent.expect_launch_consent_ui().times(1).returning(|| Ok(()));
        let control = control(MockTunnelEngine::new(), MockServiceManager::new(), consent);

        let result = outcome(|cb| control.set_tunnel("missing".to_string(), true, cb)).await;
        assert_eq!(
            result,
            CallbackOutcome::Error(Some("No such tunnel: missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_set_auto_tunnel_uses_service_manager() {
        let mut services = MockServiceManager::new();
        services
            .expect_start_auto_tunnel()
            .withf(|foreground| !*foreground)
            .times(1)
            .returning(|_| Ok(()));
        services.expect_stop_auto_tunnel().times(1).returning(|| Ok(()));
        let control = control(MockTunnelEngine::new(), services, granted());

        assert!(outcome(|cb| control.set_auto_tunnel(true, cb)).await.is_success());
        assert!(outcome(|cb| control.set_auto_tunnel(false, cb)).await.is_success());
    }

    #[tokio::test]
    async fn test_service_failure_is_reported() {
        let mut services = MockServiceManager::new();
        services
            .expect_start_auto_tunnel()
            .returning(|_| Err(AutoTunnelError::Service("watcher unavailable".to_string())));
        let control = control(MockTunnelEngine::new(), services, granted());

        let result = outcome(|cb| control.set_auto_tunnel(true, cb)).await;
        assert_eq!(
            result,
            CallbackOutcome::Error(Some("Service error: watcher unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_primary_name_defaults_to_none() {
        let control = control(MockTunnelEngine::new(), MockServiceManager::new(), granted());
        let (callback, rx) = ChannelNameCallback::new();
        control.get_primary_tunnel_name(Arc::new(callback));
        assert_eq!(rx.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_fail() {
        let control = control(MockTunnelEngine::new(), MockServiceManager::new(), granted());
        control.shutdown().await;

        let result = outcome(|cb| control.set_tunnel_on_ethernet(true, cb)).await;
        assert!(!result.is_success());
    }
}
