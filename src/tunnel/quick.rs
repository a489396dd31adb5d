//! wg-quick configuration parsing
//!
//! Accepts the INI-like format understood by `wg-quick(8)`: one `[Interface]`
//! section and any number of `[Peer]` sections. Keys are case-insensitive,
//! `#` starts a comment anywhere on a line. Keys this module does not model
//! (`PostUp`, `Table`, obfuscation parameters, ...) are preserved verbatim so
//! the rendered text still brings the tunnel up the same way.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{AutoTunnelError, AutoTunnelResult};

/// `[Interface]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    pub private_key: String,
    pub addresses: Vec<String>,
    pub dns: Vec<String>,
    pub listen_port: Option<u16>,
    pub mtu: Option<u32>,
    /// Unmodeled keys, in file order
    pub extra: Vec<(String, String)>,
}

/// `[Peer]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSection {
    pub public_key: String,
    pub preshared_key: Option<String>,
    pub allowed_ips: Vec<String>,
    pub endpoint: Option<String>,
    pub persistent_keepalive: Option<u16>,
    pub extra: Vec<(String, String)>,
}

/// Typed wg-quick configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WgQuickConfig {
    pub interface: InterfaceSection,
    pub peers: Vec<PeerSection>,
}

enum Section {
    None,
    Interface,
    Peer,
}

impl WgQuickConfig {
    /// Parse wg-quick text
    pub fn parse(text: &str) -> AutoTunnelResult<Self> {
        let mut interface: Option<InterfaceSection> = None;
        let mut peers: Vec<PeerSection> = Vec::new();
        let mut section = Section::None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim();
                if name.eq_ignore_ascii_case("interface") {
                    if interface.is_some() {
                        return Err(parse_error(line_no, "duplicate [Interface] section"));
                    }
                    interface = Some(InterfaceSection::default());
                    section = Section::Interface;
                } else if name.eq_ignore_ascii_case("peer") {
                    peers.push(PeerSection::default());
                    section = Section::Peer;
                } else {
                    return Err(parse_error(line_no, &format!("unknown section [{}]", name)));
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| parse_error(line_no, "expected 'Key = Value'"))?;
            if key.is_empty() {
                return Err(parse_error(line_no, "empty key"));
            }

            match section {
                Section::None => {
                    return Err(parse_error(line_no, "key outside of any section"));
                }
                Section::Interface => {
                    if let Some(iface) = interface.as_mut() {
                        apply_interface_key(iface, key, value, line_no)?;
                    }
                }
                Section::Peer => {
                    if let Some(peer) = peers.last_mut() {
                        apply_peer_key(peer, key, value, line_no)?;
                    }
                }
            }
        }

        let interface = interface
            .ok_or_else(|| AutoTunnelError::Parse("missing [Interface] section".to_string()))?;
        if interface.private_key.is_empty() {
            return Err(AutoTunnelError::Parse("missing PrivateKey in [Interface]".to_string()));
        }
        for (i, peer) in peers.iter().enumerate() {
            if peer.public_key.is_empty() {
                return Err(AutoTunnelError::Parse(format!("missing PublicKey in [Peer] #{}", i + 1)));
            }
        }

        Ok(Self { interface, peers })
    }

    /// Render back to wg-quick text
    pub fn to_quick_string(&self) -> String {
        let mut out = String::new();
        let iface = &self.interface;

        out.push_str("[Interface]\n");
        let _ = writeln!(out, "PrivateKey = {}", iface.private_key);
        if !iface.addresses.is_empty() {
            let _ = writeln!(out, "Address = {}", iface.addresses.join(", "));
        }
        if !iface.dns.is_empty() {
            let _ = writeln!(out, "DNS = {}", iface.dns.join(", "));
        }
        if let Some(port) = iface.listen_port {
            let _ = writeln!(out, "ListenPort = {}", port);
        }
        if let Some(mtu) = iface.mtu {
            let _ = writeln!(out, "MTU = {}", mtu);
        }
        for (key, value) in &iface.extra {
            let _ = writeln!(out, "{} = {}", key, value);
        }

        for peer in &self.peers {
            out.push_str("\n[Peer]\n");
            let _ = writeln!(out, "PublicKey = {}", peer.public_key);
            if let Some(psk) = &peer.preshared_key {
                let _ = writeln!(out, "PresharedKey = {}", psk);
            }
            if !peer.allowed_ips.is_empty() {
                let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips.join(", "));
            }
            if let Some(endpoint) = &peer.endpoint {
                let _ = writeln!(out, "Endpoint = {}", endpoint);
            }
            if let Some(keepalive) = peer.persistent_keepalive {
                let _ = writeln!(out, "PersistentKeepalive = {}", keepalive);
            }
            for (key, value) in &peer.extra {
                let _ = writeln!(out, "{} = {}", key, value);
            }
        }

        out
    }
}

impl FromStr for WgQuickConfig {
    type Err = AutoTunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn apply_interface_key(
    iface: &mut InterfaceSection,
    key: &str,
    value: &str,
    line_no: usize,
) -> AutoTunnelResult<()> {
    match key.to_ascii_lowercase().as_str() {
        "privatekey" => iface.private_key = parse_key(value, line_no)?,
        "address" => iface.addresses.extend(split_list(value)),
        "dns" => iface.dns.extend(split_list(value)),
        "listenport" => iface.listen_port = Some(parse_number(value, line_no)?),
        "mtu" => iface.mtu = Some(parse_number(value, line_no)?),
        _ => iface.extra.push((key.to_string(), value.to_string())),
    }
    Ok(())
}

fn apply_peer_key(peer: &mut PeerSection, key: &str, value: &str, line_no: usize) -> AutoTunnelResult<()> {
    match key.to_ascii_lowercase().as_str() {
        "publickey" => peer.public_key = parse_key(value, line_no)?,
        "presharedkey" => peer.preshared_key = Some(parse_key(value, line_no)?),
        "allowedips" => peer.allowed_ips.extend(split_list(value)),
        "endpoint" => {
            if !value.contains(':') {
                return Err(parse_error(line_no, "Endpoint must be in format 'host:port'"));
            }
            peer.endpoint = Some(value.to_string());
        }
        "persistentkeepalive" => {
            peer.persistent_keepalive = if value.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse_number(value, line_no)?)
            };
        }
        _ => peer.extra.push((key.to_string(), value.to_string())),
    }
    Ok(())
}

/// WireGuard keys are 32 bytes, base64 encoded
fn parse_key(value: &str, line_no: usize) -> AutoTunnelResult<String> {
    match STANDARD.decode(value) {
        Ok(bytes) if bytes.len() == 32 => Ok(value.to_string()),
        Ok(bytes) => Err(parse_error(
            line_no,
            &format!("key must decode to 32 bytes, got {}", bytes.len()),
        )),
        Err(e) => Err(parse_error(line_no, &format!("invalid base64 key: {}", e))),
    }
}

fn parse_number<T: FromStr>(value: &str, line_no: usize) -> AutoTunnelResult<T> {
    value
        .parse::<T>()
        .map_err(|_| parse_error(line_no, &format!("invalid number '{}'", value)))
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_error(line_no: usize, msg: &str) -> AutoTunnelError {
    AutoTunnelError::Parse(format!("line {}: {}", line_no, msg))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = "\
[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.0.0.2/32, fd00::2/128
DNS = 1.1.1.1
MTU = 1420
PostUp = echo up # comment

[Peer]
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
AllowedIPs = 0.0.0.0/0, ::/0
Endpoint = vpn.example.com:51820
PersistentKeepalive = 25
";

    #[test]
    fn test_parse_sample() {
        let config = WgQuickConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.interface.addresses, vec!["10.0.0.2/32", "fd00::2/128"]);
        assert_eq!(config.interface.dns, vec!["1.1.1.1"]);
        assert_eq!(config.interface.mtu, Some(1420));
        assert_eq!(config.interface.extra, vec![("PostUp".to_string(), "echo up".to_string())]);
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].endpoint.as_deref(), Some("vpn.example.com:51820"));
        assert_eq!(config.peers[0].persistent_keepalive, Some(25));
    }

    #[test]
    fn test_rendered_text_parses_to_same_config() {
        let config = WgQuickConfig::parse(SAMPLE).unwrap();
        let reparsed = WgQuickConfig::parse(&config.to_quick_string()).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_missing_interface() {
        let err = WgQuickConfig::parse("[Peer]\nPublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=\n")
            .unwrap_err();
        assert!(err.to_string().contains("missing [Interface]"));
    }

    #[test]
    fn test_missing_private_key() {
        let err = WgQuickConfig::parse("[Interface]\nAddress = 10.0.0.2/32\n").unwrap_err();
        assert!(err.to_string().contains("PrivateKey"));
    }

    #[test]
    fn test_missing_peer_public_key() {
        let text = "[Interface]\nPrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n[Peer]\nAllowedIPs = 0.0.0.0/0\n";
        let err = WgQuickConfig::parse(text).unwrap_err();
        assert!(err.to_string().contains("PublicKey"));
    }

    #[test]
    fn test_bad_key_is_rejected() {
        let err = WgQuickConfig::parse("[Interface]\nPrivateKey = not-a-key\n").unwrap_err();
        assert!(matches!(err, AutoTunnelError::Parse(_)));

        let err = WgQuickConfig::parse("[Interface]\nPrivateKey = AAAA\n").unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_garbage_line_reports_line_number() {
        let err = WgQuickConfig::parse("[Interface]\nthis is not a config\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let text = "[interface]\nprivatekey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\nlistenport = 51820\n";
        let config: WgQuickConfig = text.parse().unwrap();
        assert_eq!(config.interface.listen_port, Some(51820));
        assert!(config.peers.is_empty());
    }
}
