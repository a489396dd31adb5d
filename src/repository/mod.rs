//! Settings and tunnel repositories
//!
//! The repositories own all persistent state. Everything else reads them
//! through `subscribe()` streams or one-shot lookups and changes them only
//! through whole-record saves.

pub mod json;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::AutoTunnelResult;
use crate::settings::AppSettings;
use crate::tunnel::TunnelConf;

pub use json::JsonStateStore;

/// Read-modify-write step applied by [`SettingsRepository::update`]
pub type SettingsUpdate = Box<dyn FnOnce(AppSettings) -> AppSettings + Send>;

/// Owner of the [`AppSettings`] record
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Replace the settings record
    async fn save(&self, settings: AppSettings) -> AutoTunnelResult<()>;

    /// Derive the next record from the current one and persist it as one
    /// step. Concurrent updates never overwrite each other. Returns the
    /// record that was saved.
    async fn update(&self, f: SettingsUpdate) -> AutoTunnelResult<AppSettings>;

    /// Current settings record
    async fn get(&self) -> AutoTunnelResult<AppSettings>;

    /// Stream of settings records, starting with the current one
    fn subscribe(&self) -> watch::Receiver<AppSettings>;
}

/// Owner of the tunnel list
#[async_trait]
pub trait TunnelRepository: Send + Sync {
    /// Insert or replace a tunnel. A record with the same name but another id
    /// is replaced and keeps its id and primary flag.
    async fn save(&self, tunnel: TunnelConf) -> AutoTunnelResult<()>;

    async fn find_by_tunnel_name(&self, name: &str) -> AutoTunnelResult<Option<TunnelConf>>;

    async fn find_by_id(&self, id: &str) -> AutoTunnelResult<Option<TunnelConf>>;

    /// Tunnels flagged primary (zero or one)
    async fn find_primary(&self) -> AutoTunnelResult<Vec<TunnelConf>>;

    async fn delete(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()>;

    /// Make `tunnel` the only primary tunnel, or clear the flag everywhere
    async fn update_primary_tunnel(&self, tunnel: Option<&TunnelConf>) -> AutoTunnelResult<()>;

    async fn get_all(&self) -> AutoTunnelResult<Vec<TunnelConf>>;

    /// Stream of the full tunnel list, starting with the current one
    fn subscribe(&self) -> watch::Receiver<Vec<TunnelConf>>;
}

/// Eager initialization of a persistent store
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Load persisted state; a missing store means defaults
    async fn init(&self) -> AutoTunnelResult<()>;
}

/// Both repositories, handed around as one value
#[derive(Clone)]
pub struct AppDataRepository {
    pub settings: Arc<dyn SettingsRepository>,
    pub tunnels: Arc<dyn TunnelRepository>,
}

impl AppDataRepository {
    pub fn new(settings: Arc<dyn SettingsRepository>, tunnels: Arc<dyn TunnelRepository>) -> Self {
        Self { settings, tunnels }
    }

    /// Use one store for both settings and tunnels
    pub fn from_store(store: Arc<JsonStateStore>) -> Self {
        Self {
            settings: store.clone(),
            tunnels: store,
        }
    }
}
