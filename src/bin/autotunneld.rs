//! autotunneld - auto-tunnel daemon
//!
//! Owns the tunnel engine and the auto-tunnel watcher and exports the remote
//! control interface on D-Bus.

use clap::Parser;
use libautotunnel::config::{AutoTunnelConfig, BusKind, DEFAULT_CONFIG_PATH};
use libautotunnel::consent::PrivilegeConsent;
use libautotunnel::error::{AutoTunnelError, AutoTunnelResult};
use libautotunnel::lifecycle::LifecycleScope;
use libautotunnel::logging::init_logging;
use libautotunnel::remote::{self, RemoteControl, RemoteControlDeps, AUTOTUNNEL_REMOTE_PATH};
use libautotunnel::repository::{AppDataRepository, JsonStateStore};
use libautotunnel::service::{AutoTunnelService, SysfsLinkProbe};
use libautotunnel::tunnel::WgQuickEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "autotunneld")]
#[command(version)]
#[command(about = "Auto-tunnel daemon - remote control of WireGuard tunnels over D-Bus", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use the session bus instead of the system bus
    #[arg(long)]
    session: bool,
}

#[tokio::main]
async fn main() -> AutoTunnelResult<()> {
    let args = Args::parse();
    init_logging(args.verbose, &args.log_level);

    info!("Starting auto-tunnel daemon (autotunneld)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AutoTunnelConfig::load_or_default(&args.config)?;
    if let Some(data_dir) = args.data_dir {
        config.paths.data_dir = data_dir;
    }
    if args.session {
        config.remote.bus = BusKind::Session;
    }
    config.ensure_directories()?;

    #[cfg(target_os = "linux")]
    {
        let uid = unsafe { libc::getuid() };
        if uid != 0 {
            warn!("Not running as root - tunnels cannot be started until consent is granted");
        }
    }

    let store = Arc::new(JsonStateStore::new(config.state_file()));
    if let Err(e) = store.init().await {
        error!("Failed to load state from {:?}: {}", config.state_file(), e);
        return Err(e);
    }
    let repo = AppDataRepository::from_store(store);

    let scope = LifecycleScope::new("autotunneld");

    let engine = Arc::new(WgQuickEngine::new(config.paths.runtime_dir.clone()));
    if !engine.is_available().await {
        warn!("wg-quick not found - starting tunnels will fail");
    }

    let services = Arc::new(AutoTunnelService::new(
        repo.clone(),
        engine.clone(),
        Arc::new(SysfsLinkProbe::new(config.watcher.sysfs_net.clone())),
        config.watcher.poll_interval(),
        &scope,
    ));
    if let Err(e) = services.restore().await {
        warn!("Failed to restore previous tunnel state: {}", e);
    }

    let control = RemoteControl::new(
        RemoteControlDeps {
            repo,
            engine: engine.clone(),
            services: services.clone(),
            consent: Arc::new(PrivilegeConsent::new(config.consent.command.clone())),
        },
        scope.child("remote"),
        config.state.grace_period(),
    );

    let connection = match remote::dbus::serve(control.clone(), config.remote.bus, &config.remote.service_name).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to start D-Bus service: {}", e);
            error!("  This may be due to:");
            error!("  - Another instance already running");
            error!("  - Missing D-Bus policy for {}", config.remote.service_name);
            error!("  - D-Bus {:?} bus not available", config.remote.bus);
            return Err(e);
        }
    };

    info!("Auto-tunnel daemon is ready");
    info!("  Service: {}", config.remote.service_name);
    info!("  Object:  {}", AUTOTUNNEL_REMOTE_PATH);

    handle_signals().await?;

    info!("Shutting down auto-tunnel daemon...");
    control.shutdown().await;
    services.shutdown().await;
    scope.shutdown().await;
    engine.stop_all().await;
    drop(connection);

    info!("Auto-tunnel daemon stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT; SIGHUP is logged and ignored
async fn handle_signals() -> AutoTunnelResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| AutoTunnelError::Service(format!("Failed to register SIGTERM handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| AutoTunnelError::Service(format!("Failed to register SIGINT handler: {}", e)))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| AutoTunnelError::Service(format!("Failed to register SIGHUP handler: {}", e)))?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, configuration is only read at startup");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| AutoTunnelError::Service(format!("Failed to listen for Ctrl+C: {}", e)))?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}
