//! Auto-tunnel service control
//!
//! [`ServiceManager`] is what remote callers use to switch the background
//! auto-tunnel watcher on and off. [`AutoTunnelService`] is the default
//! implementation; [`link`] provides the coarse link snapshot it acts on.

pub mod auto_tunnel;
pub mod link;

use async_trait::async_trait;

use crate::error::AutoTunnelResult;

pub use auto_tunnel::{evaluate, AutoTunnelService, Decision};
pub use link::{LinkProbe, LinkSnapshot, SysfsLinkProbe};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Start the watcher. With `foreground` the first evaluation has been
    /// applied by the time this returns.
    async fn start_auto_tunnel(&self, foreground: bool) -> AutoTunnelResult<()>;

    /// Stop the watcher
    async fn stop_auto_tunnel(&self) -> AutoTunnelResult<()>;

    async fn is_auto_tunnel_running(&self) -> bool;
}
