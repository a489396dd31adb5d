//! JSON file backed repository
//!
//! Settings and tunnels live in one state file. Every mutation is applied to a
//! copy of the state, the copy is written (temp file + rename) and only then
//! committed and published, so a failed write leaves memory and disk as they
//! were.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::error::{AutoTunnelError, AutoTunnelResult};
use crate::settings::AppSettings;
use crate::tunnel::TunnelConf;
use super::{PreferencesStore, SettingsRepository, SettingsUpdate, TunnelRepository};

/// Storage format version
const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    settings: AppSettings,
    #[serde(default)]
    tunnels: Vec<TunnelConf>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            settings: AppSettings::default(),
            tunnels: Vec::new(),
        }
    }
}

/// Settings and tunnel store persisted as JSON
pub struct JsonStateStore {
    path: Option<PathBuf>,
    state: Mutex<StateFile>,
    settings_tx: watch::Sender<AppSettings>,
    tunnels_tx: watch::Sender<Vec<TunnelConf>>,
}

impl JsonStateStore {
    /// Store backed by `path`. Nothing is read until [`init`](Self::init).
    pub fn new(path: PathBuf) -> Self {
        Self::with_path(Some(path))
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        let state = StateFile::default();
        let (settings_tx, _) = watch::channel(state.settings.clone());
        let (tunnels_tx, _) = watch::channel(state.tunnels.clone());
        Self {
            path,
            state: Mutex::new(state),
            settings_tx,
            tunnels_tx,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the state file into memory. A missing file means defaults.
    pub async fn init(&self) -> AutoTunnelResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let state: StateFile = serde_json::from_str(&content).map_err(|e| {
                    AutoTunnelError::Storage(format!("Failed to parse {:?}: {}", path, e))
                })?;
                if state.version > STATE_VERSION {
                    return Err(AutoTunnelError::Storage(format!(
                        "State file version {} is newer than supported version {}",
                        state.version, STATE_VERSION
                    )));
                }
                info!("Loaded {} tunnels from {:?}", state.tunnels.len(), path);
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {:?}, starting with defaults", path);
                StateFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let mut state = self.state.lock().await;
        *state = loaded;
        self.publish(&state);
        Ok(())
    }

    /// Apply `f` to a copy of the state, persist the copy, then commit it
    async fn mutate<F, R>(&self, f: F) -> AutoTunnelResult<R>
    where
        F: FnOnce(&mut StateFile) -> AutoTunnelResult<R>,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let result = f(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        self.publish(&state);
        Ok(result)
    }

    async fn persist(&self, state: &StateFile) -> AutoTunnelResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| AutoTunnelError::Storage(format!("Failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| AutoTunnelError::Storage(format!("Failed to replace {:?}: {}", path, e)))?;
        debug!("Persisted state to {:?}", path);
        Ok(())
    }

    fn publish(&self, state: &StateFile) {
        self.settings_tx.send_replace(state.settings.clone());
        self.tunnels_tx.send_replace(state.tunnels.clone());
    }
}

#[async_trait]
impl PreferencesStore for JsonStateStore {
    async fn init(&self) -> AutoTunnelResult<()> {
        JsonStateStore::init(self).await
    }
}

#[async_trait]
impl SettingsRepository for JsonStateStore {
    async fn save(&self, settings: AppSettings) -> AutoTunnelResult<()> {
        self.mutate(|state| {
            state.settings = settings;
            Ok(())
        })
        .await
    }

    async fn update(&self, f: SettingsUpdate) -> AutoTunnelResult<AppSettings> {
        self.mutate(move |state| {
            state.settings = f(state.settings.clone());
            Ok(state.settings.clone())
        })
        .await
    }

    async fn get(&self) -> AutoTunnelResult<AppSettings> {
        Ok(self.state.lock().await.settings.clone())
    }

    fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.settings_tx.subscribe()
    }
}

#[async_trait]
impl TunnelRepository for JsonStateStore {
    async fn save(&self, tunnel: TunnelConf) -> AutoTunnelResult<()> {
        self.mutate(|state| {
            if let Some(pos) = state.tunnels.iter().position(|t| t.id == tunnel.id) {
                state.tunnels[pos] = tunnel;
            } else if let Some(pos) = state.tunnels.iter().position(|t| t.name == tunnel.name) {
                info!("Replacing configuration of tunnel {}", tunnel.name);
                state.tunnels[pos].wg_quick = tunnel.wg_quick;
            } else {
                info!("Adding tunnel {}", tunnel.name);
                state.tunnels.push(tunnel);
            }
            Ok(())
        })
        .await
    }

    async fn find_by_tunnel_name(&self, name: &str) -> AutoTunnelResult<Option<TunnelConf>> {
        let state = self.state.lock().await;
        Ok(state.tunnels.iter().find(|t| t.name == name).cloned())
    }

    async fn find_by_id(&self, id: &str) -> AutoTunnelResult<Option<TunnelConf>> {
        let state = self.state.lock().await;
        Ok(state.tunnels.iter().find(|t| t.id == id).cloned())
    }

    async fn find_primary(&self) -> AutoTunnelResult<Vec<TunnelConf>> {
        let state = self.state.lock().await;
        Ok(state.tunnels.iter().filter(|t| t.is_primary_tunnel).cloned().collect())
    }

    async fn delete(&self, tunnel: &TunnelConf) -> AutoTunnelResult<()> {
        self.mutate(|state| {
            let before = state.tunnels.len();
            state.tunnels.retain(|t| t.id != tunnel.id);
            if state.tunnels.len() < before {
                info!("Deleted tunnel {}", tunnel.name);
            }
            Ok(())
        })
        .await
    }

    async fn update_primary_tunnel(&self, tunnel: Option<&TunnelConf>) -> AutoTunnelResult<()> {
        let target = tunnel.map(|t| t.id.clone());
        self.mutate(|state| {
            if let Some(id) = &target {
                if !state.tunnels.iter().any(|t| &t.id == id) {
                    return Err(AutoTunnelError::NotFound(format!("tunnel id {}", id)));
                }
            }
            for t in state.tunnels.iter_mut() {
                t.is_primary_tunnel = target.as_deref() == Some(t.id.as_str());
            }
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> AutoTunnelResult<Vec<TunnelConf>> {
        Ok(self.state.lock().await.tunnels.clone())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<TunnelConf>> {
        self.tunnels_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::quick::tests::SAMPLE;
    use crate::tunnel::WgQuickConfig;
    use tempfile::TempDir;

    fn tunnel(name: &str) -> TunnelConf {
        let config = WgQuickConfig::parse(SAMPLE).unwrap();
        TunnelConf::from_quick_config(&config, name).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settings_updates_all_land() {
        use crate::settings::SettingToggle;
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStateStore::new(dir.path().join("state.json")));
        store.init().await.unwrap();

        let mut handles = Vec::new();
        for toggle in SettingToggle::ALL {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(Box::new(move |settings: AppSettings| settings.with_toggle(toggle, true)))
                    .await
            }));
        }
        let store_for_flag = store.clone();
        handles.push(tokio::spawn(async move {
            store_for_flag
                .update(Box::new(|settings: AppSettings| settings.with_auto_tunnel(true)))
                .await
        }));
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let settings = SettingsRepository::get(store.as_ref()).await.unwrap();
        for toggle in SettingToggle::ALL {
            assert!(toggle.get(&settings), "{} was lost", toggle);
        }
        assert!(settings.is_auto_tunnel_enabled);
        assert_eq!(*SettingsRepository::subscribe(store.as_ref()).borrow(), settings);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonStateStore::new(path.clone());
        store.init().await.unwrap();
        TunnelRepository::save(&store, tunnel("office")).await.unwrap();
        let settings = AppSettings::default().with_auto_tunnel(true);
        SettingsRepository::save(&store, settings.clone()).await.unwrap();

        let reopened = JsonStateStore::new(path);
        reopened.init().await.unwrap();
        assert_eq!(SettingsRepository::get(&reopened).await.unwrap(), settings);
        assert!(reopened.find_by_tunnel_name("office").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_init() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonStateStore::new(path);
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, AutoTunnelError::Storage(_)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().join("missing").join("state.json"));

        let err = TunnelRepository::save(&store, tunnel("office")).await.unwrap_err();
        assert!(matches!(err, AutoTunnelError::Storage(_)));
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_primary() {
        let store = JsonStateStore::in_memory();
        let office = tunnel("office");
        let home = tunnel("home");
        TunnelRepository::save(&store, office.clone()).await.unwrap();
        TunnelRepository::save(&store, home.clone()).await.unwrap();

        store.update_primary_tunnel(Some(&office)).await.unwrap();
        store.update_primary_tunnel(Some(&home)).await.unwrap();
        let primary = store.find_primary().await.unwrap();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].name, "home");

        store.update_primary_tunnel(None).await.unwrap();
        assert!(store.find_primary().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_same_name_replaces_config() {
        let store = JsonStateStore::in_memory();
        let first = tunnel("office");
        TunnelRepository::save(&store, first.clone()).await.unwrap();
        store.update_primary_tunnel(Some(&first)).await.unwrap();

        let mut second = tunnel("office");
        second.wg_quick.push_str("\n# edited\n");
        TunnelRepository::save(&store, second).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert!(all[0].is_primary_tunnel);
        assert!(all[0].wg_quick.ends_with("# edited\n"));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let store = JsonStateStore::in_memory();
        let mut rx = TunnelRepository::subscribe(&store);
        assert!(rx.borrow().is_empty());

        TunnelRepository::save(&store, tunnel("office")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
