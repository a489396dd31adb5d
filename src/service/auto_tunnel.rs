//! The auto-tunnel watcher
//!
//! While running, the watcher re-evaluates the primary tunnel whenever the
//! settings or tunnel list change and on every poll tick. The decision itself
//! is the pure function [`evaluate`]; the watcher only applies changes in the
//! decision.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::link::{LinkProbe, LinkSnapshot};
use super::ServiceManager;
use crate::error::AutoTunnelResult;
use crate::lifecycle::LifecycleScope;
use crate::repository::AppDataRepository;
use crate::settings::AppSettings;
use crate::tunnel::TunnelEngine;

/// What to do with the primary tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Start,
    Stop,
    /// Leave the tunnel as it is
    Hold,
}

/// Decide what the primary tunnel should do for the given settings and links.
///
/// The most preferred link that is up decides: ethernet, then Wi-Fi, then
/// mobile data. With no link up the tunnel is stopped only when
/// stop-on-no-internet is set.
pub fn evaluate(settings: &AppSettings, links: &LinkSnapshot) -> Decision {
    if !settings.is_auto_tunnel_enabled {
        return Decision::Hold;
    }

    if !links.any_up() {
        return if settings.is_stop_on_no_internet_enabled {
            Decision::Stop
        } else {
            Decision::Hold
        };
    }

    let wanted = if links.ethernet {
        settings.is_tunnel_on_ethernet_enabled
    } else if links.wifi {
        settings.is_tunnel_on_wifi_enabled
    } else {
        settings.is_tunnel_on_mobile_data_enabled
    };

    if wanted {
        Decision::Start
    } else {
        Decision::Stop
    }
}

struct Watcher {
    repo: AppDataRepository,
    engine: Arc<dyn TunnelEngine>,
    probe: Arc<dyn LinkProbe>,
    poll_interval: Duration,
    /// Last applied decision and the tunnel it was applied to
    last: Option<(Decision, String)>,
}

impl Watcher {
    async fn step(&mut self, settings: &AppSettings) {
        let links = self.probe.snapshot().await;
        let decision = evaluate(settings, &links);
        if decision == Decision::Hold {
            self.last = None;
            return;
        }

        let primary = match self.repo.tunnels.find_primary().await {
            Ok(primary) => primary.into_iter().next(),
            Err(e) => {
                warn!("Auto-tunnel could not read the primary tunnel: {}", e);
                return;
            }
        };
        let Some(tunnel) = primary else {
            debug!("Auto-tunnel: no primary tunnel");
            return;
        };

        let key = (decision, tunnel.id.clone());
        if self.last.as_ref() == Some(&key) {
            // Repeat only if the tunnel was started or stopped behind our back
            let running = self.engine.active_tunnels().await.contains(&tunnel.id);
            if running == (decision == Decision::Start) {
                return;
            }
            debug!("Auto-tunnel: {} changed state outside the watcher", tunnel.name);
        }

        let result = match decision {
            Decision::Start => self.engine.start_tunnel(&tunnel).await,
            Decision::Stop => self.engine.stop_tunnel(&tunnel).await,
            Decision::Hold => Ok(()),
        };
        match result {
            Ok(()) => {
                info!("Auto-tunnel applied {:?} to {} ({:?})", decision, tunnel.name, links);
                self.last = Some(key);
            }
            Err(e) => warn!("Auto-tunnel failed to apply {:?} to {}: {}", decision, tunnel.name, e),
        }
    }

    async fn run(mut self) {
        let mut settings_rx = self.repo.settings.subscribe();
        let mut tunnels_rx = self.repo.tunnels.subscribe();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = tunnels_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let settings = settings_rx.borrow_and_update().clone();
            tunnels_rx.borrow_and_update();
            self.step(&settings).await;
        }
        debug!("Auto-tunnel watcher exited");
    }
}

/// Default [`ServiceManager`]: runs the watcher on a child scope per activation
pub struct AutoTunnelService {
    repo: AppDataRepository,
    engine: Arc<dyn TunnelEngine>,
    probe: Arc<dyn LinkProbe>,
    poll_interval: Duration,
    scope: LifecycleScope,
    watcher: Mutex<Option<LifecycleScope>>,
}

impl AutoTunnelService {
    pub fn new(
        repo: AppDataRepository,
        engine: Arc<dyn TunnelEngine>,
        probe: Arc<dyn LinkProbe>,
        poll_interval: Duration,
        scope: &LifecycleScope,
    ) -> Self {
        Self {
            repo,
            engine,
            probe,
            poll_interval,
            scope: scope.child("auto-tunnel"),
            watcher: Mutex::new(None),
        }
    }

    /// Bring back what the previous run left behind, if restore-on-boot is set
    pub async fn restore(&self) -> AutoTunnelResult<()> {
        let settings = self.repo.settings.get().await?;
        if !settings.is_restore_on_boot_enabled {
            debug!("Restore on boot disabled");
            return Ok(());
        }

        if settings.is_auto_tunnel_enabled {
            info!("Restoring auto-tunnel");
            return self.start_auto_tunnel(false).await;
        }

        if let Some(tunnel) = self.repo.tunnels.find_primary().await?.into_iter().next() {
            info!("Restoring primary tunnel {}", tunnel.name);
            self.engine.start_tunnel(&tunnel).await?;
        }
        Ok(())
    }

    /// Stop the watcher without touching the persisted setting
    pub async fn shutdown(&self) {
        if let Some(scope) = self.watcher.lock().await.take() {
            scope.shutdown().await;
        }
        self.scope.shutdown().await;
    }
}

#[async_trait]
impl ServiceManager for AutoTunnelService {
    async fn start_auto_tunnel(&self, foreground: bool) -> AutoTunnelResult<()> {
        self.repo
            .settings
            .update(Box::new(|settings: AppSettings| settings.with_auto_tunnel(true)))
            .await?;

        let mut watcher_slot = self.watcher.lock().await;
        if watcher_slot.as_ref().is_some_and(|scope| scope.is_active()) {
            debug!("Auto-tunnel already running");
            return Ok(());
        }

        let mut watcher = Watcher {
            repo: self.repo.clone(),
            engine: self.engine.clone(),
            probe: self.probe.clone(),
            poll_interval: self.poll_interval,
            last: None,
        };
        if foreground {
            let settings = self.repo.settings.get().await?;
            watcher.step(&settings).await;
        }

        let scope = self.scope.child("auto-tunnel-watcher");
        scope.launch(watcher.run());
        *watcher_slot = Some(scope);
        info!("Auto-tunnel started");
        Ok(())
    }

    async fn stop_auto_tunnel(&self) -> AutoTunnelResult<()> {
        self.repo
            .settings
            .update(Box::new(|settings: AppSettings| settings.with_auto_tunnel(false)))
            .await?;

        if let Some(scope) = self.watcher.lock().await.take() {
            scope.shutdown().await;
            info!("Auto-tunnel stopped");
        }
        Ok(())
    }

    async fn is_auto_tunnel_running(&self) -> bool {
        self.watcher
            .lock()
            .await
            .as_ref()
            .is_some_and(|scope| scope.is_active())
    }
}
