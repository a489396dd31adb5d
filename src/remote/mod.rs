//! Remote control of tunnels and auto-tunnel settings
//!
//! [`RemoteControl`] is the in-process façade: every operation returns right
//! away and reports its outcome through a callback. [`dbus`] exposes it on
//! the bus as `org.autotunnel.Remote`, where outcomes arrive as signals
//! correlated by a request token, and [`client`] is the matching proxy.

pub mod boundary;
pub mod callback;
pub mod client;
pub mod control;
pub mod dbus;

pub use callback::{
    CallbackOutcome, ChannelCallback, ChannelNameCallback, ChannelTunnelListCallback, RemoteCallback,
    TunnelListCallback, TunnelNameCallback,
};
pub use client::RemoteClient;
pub use control::{RemoteControl, RemoteControlDeps};
pub use dbus::RemoteInterface;

/// Well-known bus name of the daemon
pub const AUTOTUNNEL_DBUS_SERVICE: &str = "org.autotunnel.AutoTunnel";

/// Object path of the remote control object
pub const AUTOTUNNEL_REMOTE_PATH: &str = "/org/autotunnel/Remote";

/// Interface name of the remote control object
pub const AUTOTUNNEL_REMOTE_INTERFACE: &str = "org.autotunnel.Remote";
