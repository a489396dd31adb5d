//! Link snapshots from sysfs
//!
//! Only answers "which kinds of uplink are up right now". Interfaces this
//! daemon creates (`wg-*`) and virtual plumbing (bridges, veth, docker) are
//! ignored.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which uplink kinds are currently up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub ethernet: bool,
    pub wifi: bool,
    pub mobile: bool,
}

impl LinkSnapshot {
    pub fn any_up(&self) -> bool {
        self.ethernet || self.wifi || self.mobile
    }
}

#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn snapshot(&self) -> LinkSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Ethernet,
    Wifi,
    Mobile,
}

/// Reads `/sys/class/net/<iface>/{operstate,wireless}`
pub struct SysfsLinkProbe {
    root: PathBuf,
}

impl SysfsLinkProbe {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn classify(root: &Path, name: &str) -> Option<LinkKind> {
        const IGNORED: [&str; 6] = ["lo", "wg", "tun", "docker", "veth", "br"];
        if IGNORED.iter().any(|prefix| name.starts_with(prefix)) {
            return None;
        }
        if root.join(name).join("wireless").exists() || name.starts_with("wl") {
            return Some(LinkKind::Wifi);
        }
        if ["wwan", "rmnet", "ppp", "usb"].iter().any(|p| name.starts_with(p)) {
            return Some(LinkKind::Mobile);
        }
        if name.starts_with("eth") || name.starts_with("en") {
            return Some(LinkKind::Ethernet);
        }
        None
    }

    /// Read operstate from sysfs - returns true if interface is "up"
    async fn read_operstate(root: &Path, name: &str) -> bool {
        match tokio::fs::read_to_string(root.join(name).join("operstate")).await {
            Ok(state) => state.trim() == "up",
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LinkProbe for SysfsLinkProbe {
    async fn snapshot(&self) -> LinkSnapshot {
        let mut snapshot = LinkSnapshot::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot read {:?}: {}", self.root, e);
                return snapshot;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(kind) = Self::classify(&self.root, &name) else {
                continue;
            };
            if !Self::read_operstate(&self.root, &name).await {
                continue;
            }
            match kind {
                LinkKind::Ethernet => snapshot.ethernet = true,
                LinkKind::Wifi => snapshot.wifi = true,
                LinkKind::Mobile => snapshot.mobile = true,
            }
        }

        debug!("Link snapshot: {:?}", snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_iface(root: &Path, name: &str, operstate: &str, wireless: bool) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
        if wireless {
            std::fs::create_dir_all(dir.join("wireless")).unwrap();
        }
    }

    #[tokio::test]
    async fn test_snapshot_classifies_links() {
        let dir = TempDir::new().unwrap();
        add_iface(dir.path(), "lo", "unknown", false);
        add_iface(dir.path(), "enp3s0", "down", false);
        add_iface(dir.path(), "mywifi", "up", true);
        add_iface(dir.path(), "wwan0", "up", false);
        add_iface(dir.path(), "wg-1234abcd", "up", false);

        let snapshot = SysfsLinkProbe::new(dir.path().to_path_buf()).snapshot().await;
        assert_eq!(
            snapshot,
            LinkSnapshot {
                ethernet: false,
                wifi: true,
                mobile: true,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_root_means_nothing_up() {
        let dir = TempDir::new().unwrap();
        let probe = SysfsLinkProbe::new(dir.path().join("absent"));
        assert!(!probe.snapshot().await.any_up());
    }
}
