//! `org.autotunnel.Remote` D-Bus interface
//!
//! Every method returns a request token immediately. The outcome follows as
//! a signal carrying the same token: `Success`, `Failure` (with a message),
//! `PrimaryName` (empty when there is no primary tunnel) or `TunnelNames`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{interface, Connection};

use super::callback::{RemoteCallback, TunnelListCallback, TunnelNameCallback};
use super::control::RemoteControl;
use super::{AUTOTUNNEL_REMOTE_PATH, AUTOTUNNEL_REMOTE_INTERFACE};
use crate::config::BusKind;
use crate::error::{AutoTunnelError, AutoTunnelResult};

/// D-Bus adapter around a [`RemoteControl`]
pub struct RemoteInterface {
    control: RemoteControl,
    next_token: AtomicU64,
}

impl RemoteInterface {
    pub fn new(control: RemoteControl) -> Self {
        Self {
            control,
            next_token: AtomicU64::new(1),
        }
    }

    fn token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn reply(&self, connection: &Connection, token: u64) -> SignalReply {
        SignalReply {
            connection: connection.clone(),
            token,
        }
    }
}

#[interface(name = "org.autotunnel.Remote")]
impl RemoteInterface {
    async fn save_tunnel(&self, #[zbus(connection)] connection: &Connection, name: String, config: String) -> u64 {
        let token = self.token();
        self.control
            .save_tunnel(name, config, Arc::new(self.reply(connection, token)));
        token
    }

    async fn delete_tunnel(&self, #[zbus(connection)] connection: &Connection, name: String) -> u64 {
        let token = self.token();
        self.control.delete_tunnel(name, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_as_primary_tunnel(&self, #[zbus(connection)] connection: &Connection, name: String) -> u64 {
        let token = self.token();
        self.control
            .set_as_primary_tunnel(name, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_tunnel(&self, #[zbus(connection)] connection: &Connection, name: String, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_tunnel(name, enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_auto_tunnel(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_auto_tunnel(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_tunnel_on_mobile_data(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_tunnel_on_mobile_data(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_tunnel_on_untrusted_wifi(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_tunnel_on_untrusted_wifi(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_tunnel_on_ethernet(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_tunnel_on_ethernet(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_stop_on_no_internet(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_stop_on_no_internet(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn set_start_on_boot(&self, #[zbus(connection)] connection: &Connection, enabled: bool) -> u64 {
        let token = self.token();
        self.control
            .set_start_on_boot(enabled, Arc::new(self.reply(connection, token)));
        token
    }

    async fn get_primary_tunnel_name(&self, #[zbus(connection)] connection: &Connection) -> u64 {
        let token = self.token();
        self.control
            .get_primary_tunnel_name(Arc::new(self.reply(connection, token)));
        token
    }

    async fn list_tunnels(&self, #[zbus(connection)] connection: &Connection) -> u64 {
        let token = self.token();
        self.control.list_tunnels(Arc::new(self.reply(connection, token)));
        token
    }

    /// Package version of the daemon
    #[zbus(property)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Request `token` completed
    #[zbus(signal)]
    async fn success(signal_emitter: &SignalEmitter<'_>, token: u64) -> zbus::Result<()>;

    /// Request `token` failed
    #[zbus(signal)]
    async fn failure(signal_emitter: &SignalEmitter<'_>, token: u64, message: &str) -> zbus::Result<()>;

    /// Primary tunnel name for request `token`; empty for none
    #[zbus(signal)]
    async fn primary_name(signal_emitter: &SignalEmitter<'_>, token: u64, name: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn tunnel_names(signal_emitter: &SignalEmitter<'_>, token: u64, names: Vec<String>) -> zbus::Result<()>;
}

/// Callback that answers a bus request with a signal
struct SignalReply {
    connection: Connection,
    token: u64,
}

impl SignalReply {
    fn send<F, Fut>(&self, emit: F)
    where
        F: FnOnce(Connection, u64) -> Fut,
        Fut: std::future::Future<Output = AutoTunnelResult<()>> + Send + 'static,
    {
        let token = self.token;
        let fut = emit(self.connection.clone(), token);
        // Not tied to the façade's scope: a request refused after shutdown
        // still owes its caller an answer
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!("Failed to signal outcome of request {}: {}", token, e);
            }
        });
    }
}

impl RemoteCallback for SignalReply {
    fn on_success(&self) {
        self.send(|conn, token| async move { signals::emit_success(&conn, token).await });
    }

    fn on_error(&self, message: Option<String>) {
        let message = message.unwrap_or_default();
        self.send(move |conn, token| async move { signals::emit_failure(&conn, token, &message).await });
    }
}

impl TunnelNameCallback for SignalReply {
    fn on_name(&self, name: Option<String>) {
        let name = name.unwrap_or_default();
        self.send(move |conn, token| async move { signals::emit_primary_name(&conn, token, &name).await });
    }
}

impl TunnelListCallback for SignalReply {
    fn on_names(&self, names: Vec<String>) {
        self.send(move |conn, token| async move { signals::emit_tunnel_names(&conn, token, names).await });
    }

    fn on_error(&self, message: Option<String>) {
        RemoteCallback::on_error(self, message);
    }
}

/// Connect to `bus`, export `control` and claim `service_name`
pub async fn serve(control: RemoteControl, bus: BusKind, service_name: &str) -> AutoTunnelResult<Connection> {
    let connection = match bus {
        BusKind::System => Connection::system().await,
        BusKind::Session => Connection::session().await,
    }
    .map_err(|e| AutoTunnelError::Dbus(format!("Failed to connect to D-Bus: {}", e)))?;

    connection
        .object_server()
        .at(AUTOTUNNEL_REMOTE_PATH, RemoteInterface::new(control))
        .await
        .map_err(|e| AutoTunnelError::Dbus(format!("Failed to register {}: {}", AUTOTUNNEL_REMOTE_INTERFACE, e)))?;
    info!("Registered {} at {}", AUTOTUNNEL_REMOTE_INTERFACE, AUTOTUNNEL_REMOTE_PATH);

    connection
        .request_name(service_name.to_string())
        .await
        .map_err(|e| AutoTunnelError::Dbus(format!("Failed to request D-Bus name '{}': {}", service_name, e)))?;
    info!("Registered D-Bus service: {}", service_name);

    Ok(connection)
}

/// Helper module for emitting remote signals
pub mod signals {
    use super::*;

    async fn emitter(conn: &Connection) -> AutoTunnelResult<zbus::object_server::InterfaceRef<RemoteInterface>> {
        conn.object_server()
            .interface::<_, RemoteInterface>(AUTOTUNNEL_REMOTE_PATH)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Remote interface not registered: {}", e)))
    }

    /// Emit Success signal
    pub async fn emit_success(conn: &Connection, token: u64) -> AutoTunnelResult<()> {
        let iface_ref = emitter(conn).await?;
        RemoteInterface::success(iface_ref.signal_emitter(), token)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to emit Success: {}", e)))
    }

    /// Emit Failure signal
    pub async fn emit_failure(conn: &Connection, token: u64, message: &str) -> AutoTunnelResult<()> {
        let iface_ref = emitter(conn).await?;
        RemoteInterface::failure(iface_ref.signal_emitter(), token, message)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to emit Failure: {}", e)))
    }

    /// Emit PrimaryName signal
    pub async fn emit_primary_name(conn: &Connection, token: u64, name: &str) -> AutoTunnelResult<()> {
        let iface_ref = emitter(conn).await?;
        RemoteInterface::primary_name(iface_ref.signal_emitter(), token, name)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to emit PrimaryName: {}", e)))
    }

    /// Emit TunnelNames signal
    pub async fn emit_tunnel_names(conn: &Connection, token: u64, names: Vec<String>) -> AutoTunnelResult<()> {
        let iface_ref = emitter(conn).await?;
        RemoteInterface::tunnel_names(iface_ref.signal_emitter(), token, names)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to emit TunnelNames: {}", e)))
    }
}
