//! Text rendering of the four destinations

use std::fmt::Write;

use super::navigation::Destination;
use super::snackbar::SnackbarHost;
use super::FocusHandle;
use crate::error::AutoTunnelResult;
use crate::repository::AppDataRepository;
use crate::settings::SettingToggle;

/// What every screen gets from the shell
pub struct ScreenContext<'a> {
    pub repo: &'a AppDataRepository,
    pub snackbar: &'a SnackbarHost,
    pub focus: &'a FocusHandle,
}

pub async fn render(ctx: &ScreenContext<'_>, destination: &Destination) -> AutoTunnelResult<String> {
    match destination {
        Destination::Main => render_main(ctx).await,
        Destination::Settings => render_settings(ctx).await,
        Destination::Support => Ok(render_support(ctx)),
        Destination::Config { id } => render_config(ctx, id).await,
    }
}

async fn render_main(ctx: &ScreenContext<'_>) -> AutoTunnelResult<String> {
    let tunnels = ctx.repo.tunnels.get_all().await?;
    let settings = ctx.repo.settings.get().await?;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Auto-tunnel: {}",
        if settings.is_auto_tunnel_enabled { "on" } else { "off" }
    );
    let _ = writeln!(out);

    if tunnels.is_empty() {
        let _ = writeln!(out, "No tunnels. Add one with `atcli save-tunnel NAME FILE`.");
        return Ok(out);
    }

    let _ = writeln!(out, "{:<24} {:<8} {}", "NAME", "PRIMARY", "ID");
    for tunnel in &tunnels {
        let _ = writeln!(
            out,
            "{:<24} {:<8} {}",
            tunnel.name,
            if tunnel.is_primary_tunnel { "yes" } else { "" },
            tunnel.id
        );
    }
    if let Some(first) = tunnels.first() {
        ctx.focus.request(format!("tunnel:{}", first.id));
    }
    Ok(out)
}

async fn render_settings(ctx: &ScreenContext<'_>) -> AutoTunnelResult<String> {
    let settings = ctx.repo.settings.get().await?;

    let mut out = String::new();
    let mark = |on: bool| if on { "[x]" } else { "[ ]" };
    let _ = writeln!(out, "{} auto-tunnel", mark(settings.is_auto_tunnel_enabled));
    for toggle in SettingToggle::ALL {
        let _ = writeln!(out, "{} {}", mark(toggle.get(&settings)), toggle);
    }
    if !settings.trusted_network_ssids.is_empty() {
        let _ = writeln!(out, "Trusted networks: {}", settings.trusted_network_ssids.join(", "));
    }
    ctx.focus.request("setting:auto-tunnel");
    Ok(out)
}

fn render_support(ctx: &ScreenContext<'_>) -> String {
    ctx.focus.request("support:version");
    format!(
        "autotunnel {}\n\nDaemon: autotunneld\nRemote interface: {}\n",
        env!("CARGO_PKG_VERSION"),
        crate::remote::AUTOTUNNEL_REMOTE_INTERFACE
    )
}

async fn render_config(ctx: &ScreenContext<'_>, id: &str) -> AutoTunnelResult<String> {
    let Some(tunnel) = ctx.repo.tunnels.find_by_id(id).await? else {
        ctx.snackbar.show(format!("Tunnel {} not found", id));
        return Ok(String::new());
    };

    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", tunnel.name);
    let _ = writeln!(out, "Primary: {}", if tunnel.is_primary_tunnel { "yes" } else { "no" });
    let _ = writeln!(out);
    out.push_str(&redact_secrets(&tunnel.wg_quick));
    ctx.focus.request("config:name");
    Ok(out)
}

/// Hide private and preshared keys
fn redact_secrets(quick: &str) -> String {
    let mut out = String::new();
    for line in quick.lines() {
        let key = line.split('=').next().unwrap_or("").trim().to_ascii_lowercase();
        if key == "privatekey" || key == "presharedkey" {
            let original = line.split('=').next().unwrap_or("").trim();
            let _ = writeln!(out, "{} = (hidden)", original);
        } else {
            let _ = writeln!(out, "{}", line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::JsonStateStore;
    use crate::tunnel::{quick, TunnelConf, WgQuickConfig};
    use std::sync::Arc;

    #[test]
    fn test_redact_secrets() {
        let redacted = redact_secrets("[Interface]\nPrivateKey = abc\nAddress = 10.0.0.2/32\n");
        assert!(redacted.contains("PrivateKey = (hidden)"));
        assert!(redacted.contains("Address = 10.0.0.2/32"));
        assert!(!redacted.contains("abc"));
    }

    #[tokio::test]
    async fn test_config_screen_for_unknown_id_posts_snackbar() {
        let repo = AppDataRepository::from_store(Arc::new(JsonStateStore::in_memory()));
        let (snackbar, mut queue) = SnackbarHost::channel();
        let focus = FocusHandle::default();
        let ctx = ScreenContext {
            repo: &repo,
            snackbar: &snackbar,
            focus: &focus,
        };

        let body = render(&ctx, &Destination::Config { id: "nope".to_string() })
            .await
            .unwrap();
        assert!(body.is_empty());
        assert_eq!(queue.drain()[0].message, "Tunnel nope not found");
    }

    #[tokio::test]
    async fn test_main_screen_lists_tunnels() {
        let repo = AppDataRepository::from_store(Arc::new(JsonStateStore::in_memory()));
        let config = WgQuickConfig::parse(quick::tests::SAMPLE).unwrap();
        let tunnel = TunnelConf::from_quick_config(&config, "office").unwrap();
        repo.tunnels.save(tunnel.clone()).await.unwrap();
        repo.tunnels.update_primary_tunnel(Some(&tunnel)).await.unwrap();

        let (snackbar, _queue) = SnackbarHost::channel();
        let focus = FocusHandle::default();
        let ctx = ScreenContext {
            repo: &repo,
            snackbar: &snackbar,
            focus: &focus,
        };

        let body = render(&ctx, &Destination::Main).await.unwrap();
        assert!(body.contains("office"));
        assert!(body.contains("yes"));
        assert_eq!(focus.current(), Some(format!("tunnel:{}", tunnel.id)));
    }
}
