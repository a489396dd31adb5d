//! D-Bus client for the remote control interface
//!
//! Wraps the token/signal protocol of `org.autotunnel.Remote` into plain
//! async calls: each call subscribes to the interface's signals, invokes the
//! method and waits for the signal carrying the returned token.
//!
//! ```rust,no_run
//! use libautotunnel::config::BusKind;
//! use libautotunnel::remote::{RemoteClient, AUTOTUNNEL_DBUS_SERVICE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RemoteClient::connect(BusKind::System, AUTOTUNNEL_DBUS_SERVICE).await?;
//!     client.set_tunnel("office", true).await?;
//!     println!("primary: {:?}", client.get_primary_tunnel_name().await?);
//!     Ok(())
//! }
//! ```

use futures::StreamExt;
use std::time::Duration;
use tracing::debug;
use zbus::message::Type as MessageType;
use zbus::{Connection, MatchRule, Message, MessageStream};

use super::{AUTOTUNNEL_REMOTE_INTERFACE, AUTOTUNNEL_REMOTE_PATH};
use crate::config::BusKind;
use crate::error::{AutoTunnelError, AutoTunnelResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a running autotunneld
pub struct RemoteClient {
    connection: Connection,
    service_name: String,
    /// Unique bus name of the daemon
    owner: String,
    timeout: Duration,
}

impl RemoteClient {
    /// Connect to the daemon owning `service_name` on `bus`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot connect to the bus
    /// - The daemon is not running
    pub async fn connect(bus: BusKind, service_name: &str) -> AutoTunnelResult<Self> {
        let connection = match bus {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .map_err(|e| AutoTunnelError::Dbus(format!("Failed to connect to D-Bus: {}", e)))?;

        let proxy = zbus::fdo::DBusProxy::new(&connection)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to create D-Bus proxy: {}", e)))?;

        let name: zbus::names::BusName<'_> = service_name
            .try_into()
            .map_err(|_| AutoTunnelError::Dbus(format!("Invalid D-Bus service name: {}", service_name)))?;
        match proxy.name_has_owner(name.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AutoTunnelError::Service(format!(
                    "Service {} is not available. Is autotunneld running?",
                    service_name
                )));
            }
            Err(e) => {
                return Err(AutoTunnelError::Dbus(format!(
                    "Failed to check service availability: {}",
                    e
                )));
            }
        }

        // Outcome signals are matched on the owner's unique name
        let owner = proxy
            .get_name_owner(name)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to resolve owner of {}: {}", service_name, e)))?
            .to_string();

        Ok(Self {
            connection,
            service_name: service_name.to_string(),
            owner,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// How long to wait for the outcome signal of a request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn save_tunnel(&self, name: &str, config: &str) -> AutoTunnelResult<()> {
        self.call_status("SaveTunnel", &(name, config)).await
    }

    pub async fn delete_tunnel(&self, name: &str) -> AutoTunnelResult<()> {
        self.call_status("DeleteTunnel", &(name,)).await
    }

    pub async fn set_as_primary_tunnel(&self, name: &str) -> AutoTunnelResult<()> {
        self.call_status("SetAsPrimaryTunnel", &(name,)).await
    }

    pub async fn set_tunnel(&self, name: &str, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetTunnel", &(name, enabled)).await
    }

    pub async fn set_auto_tunnel(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetAutoTunnel", &(enabled,)).await
    }

    pub async fn set_tunnel_on_mobile_data(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetTunnelOnMobileData", &(enabled,)).await
    }

    pub async fn set_tunnel_on_untrusted_wifi(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetTunnelOnUntrustedWifi", &(enabled,)).await
    }

    pub async fn set_tunnel_on_ethernet(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetTunnelOnEthernet", &(enabled,)).await
    }

    pub async fn set_stop_on_no_internet(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetStopOnNoInternet", &(enabled,)).await
    }

    pub async fn set_start_on_boot(&self, enabled: bool) -> AutoTunnelResult<()> {
        self.call_status("SetStartOnBoot", &(enabled,)).await
    }

    /// Name of the primary tunnel, `None` when there is none
    pub async fn get_primary_tunnel_name(&self) -> AutoTunnelResult<Option<String>> {
        let (stream, token) = self.request("GetPrimaryTunnelName", &()).await?;
        let message = self.await_outcome(stream, token).await?;
        let (_, name): (u64, String) = deserialize(&message)?;
        Ok(Some(name).filter(|name| !name.is_empty()))
    }

    pub async fn list_tunnels(&self) -> AutoTunnelResult<Vec<String>> {
        let (stream, token) = self.request("ListTunnels", &()).await?;
        let message = self.await_outcome(stream, token).await?;
        match member(&message).as_deref() {
            Some("TunnelNames") => {
                let (_, names): (u64, Vec<String>) = deserialize(&message)?;
                Ok(names)
            }
            _ => Err(failure(&message)),
        }
    }

    async fn call_status<B>(&self, method: &str, body: &B) -> AutoTunnelResult<()>
    where
        B: serde::ser::Serialize + zbus::zvariant::DynamicType,
    {
        let (stream, token) = self.request(method, body).await?;
        let message = self.await_outcome(stream, token).await?;
        match member(&message).as_deref() {
            Some("Success") => Ok(()),
            _ => Err(failure(&message)),
        }
    }

    /// Subscribe to outcome signals, then invoke `method` and return its token
    async fn request<B>(&self, method: &str, body: &B) -> AutoTunnelResult<(MessageStream, u64)>
    where
        B: serde::ser::Serialize + zbus::zvariant::DynamicType,
    {
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(self.owner.as_str())?
            .interface(AUTOTUNNEL_REMOTE_INTERFACE)?
            .path(AUTOTUNNEL_REMOTE_PATH)?
            .build();
        let stream = MessageStream::for_match_rule(rule, &self.connection, None)
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to subscribe to signals: {}", e)))?;

        let token: u64 = self
            .connection
            .call_method(
                Some(self.service_name.as_str()),
                AUTOTUNNEL_REMOTE_PATH,
                Some(AUTOTUNNEL_REMOTE_INTERFACE),
                method,
                body,
            )
            .await
            .map_err(|e| AutoTunnelError::Dbus(format!("D-Bus method call failed: {}", e)))?
            .body()
            .deserialize()
            .map_err(|e| AutoTunnelError::Dbus(format!("Failed to deserialize response: {}", e)))?;
        debug!("{} accepted as request {}", method, token);

        Ok((stream, token))
    }

    async fn await_outcome(&self, mut stream: MessageStream, token: u64) -> AutoTunnelResult<Message> {
        let wait = async {
            while let Some(message) = stream.next().await {
                let Ok(message) = message else {
                    continue;
                };
                if signal_token(&message) == Some(token) {
                    return Ok(message);
                }
            }
            Err(AutoTunnelError::Dbus("Signal stream closed".to_string()))
        };

        tokio::time::timeout(self.timeout, wait).await.map_err(|_| {
            AutoTunnelError::Service(format!("No answer for request {} within {:?}", token, self.timeout))
        })?
    }
}

fn member(message: &Message) -> Option<String> {
    message.header().member().map(|m| m.to_string())
}

fn deserialize<T>(message: &Message) -> AutoTunnelResult<T>
where
    T: serde::de::DeserializeOwned + zbus::zvariant::Type,
{
    message
        .body()
        .deserialize()
        .map_err(|e| AutoTunnelError::Dbus(format!("Failed to deserialize signal: {}", e)))
}

/// Token of an outcome signal, if `message` is one
fn signal_token(message: &Message) -> Option<u64> {
    match member(message)?.as_str() {
        "Success" => deserialize::<(u64,)>(message).ok().map(|(token,)| token),
        "Failure" | "PrimaryName" => deserialize::<(u64, String)>(message).ok().map(|(token, _)| token),
        "TunnelNames" => deserialize::<(u64, Vec<String>)>(message).ok().map(|(token, _)| token),
        _ => None,
    }
}

fn failure(message: &Message) -> AutoTunnelError {
    match deserialize::<(u64, String)>(message) {
        Ok((_, reason)) if !reason.is_empty() => AutoTunnelError::Service(reason),
        _ => AutoTunnelError::Service("Request failed".to_string()),
    }
}
