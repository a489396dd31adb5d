//! atcli - auto-tunnel command line tool
//!
//! Talks to a running autotunneld over D-Bus. The `ui` subcommand renders the
//! terminal shell from the local state file instead.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use libautotunnel::config::{AutoTunnelConfig, BusKind, DEFAULT_CONFIG_PATH};
use libautotunnel::consent::PrivilegeConsent;
use libautotunnel::logging::init_logging;
use libautotunnel::remote::RemoteClient;
use libautotunnel::repository::{AppDataRepository, JsonStateStore};
use libautotunnel::shell::{LaunchOptions, NotificationPermission, Shell, ShellDeps};
use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "atcli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Auto-tunnel CLI - control tunnels and auto-tunnel triggers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    /// D-Bus name of the daemon
    #[arg(long, global = true)]
    service_name: Option<String>,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the data directory (used by `ui`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        self == Switch::On
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a wg-quick configuration as tunnel NAME (FILE `-` reads stdin)
    SaveTunnel { name: String, file: PathBuf },
    /// Delete tunnel NAME
    DeleteTunnel { name: String },
    /// Make NAME the primary tunnel
    SetPrimary { name: String },
    /// Start or stop tunnel NAME
    SetTunnel { name: String, state: Switch },
    /// Start or stop the auto-tunnel watcher
    AutoTunnel { state: Switch },
    /// Tunnel on mobile data
    MobileData { state: Switch },
    /// Tunnel on untrusted Wi-Fi
    UntrustedWifi { state: Switch },
    /// Tunnel on ethernet
    Ethernet { state: Switch },
    /// Stop the tunnel when no link is up
    StopOnNoInternet { state: Switch },
    /// Restore tunnels at daemon start
    StartOnBoot { state: Switch },
    /// Print the primary tunnel name
    PrimaryName,
    /// List stored tunnels
    ListTunnels,
    /// Render the terminal shell
    Ui {
        /// main, settings, support or config/{id}
        #[arg(default_value = "main")]
        route: String,

        /// Show the VPN consent interstitial first
        #[arg(long)]
        prepare: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, &cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AutoTunnelConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(data_dir) = &cli.data_dir {
        config.paths.data_dir = data_dir.clone();
    }
    if cli.session {
        config.remote.bus = BusKind::Session;
    }
    if let Some(service_name) = &cli.service_name {
        config.remote.service_name = service_name.clone();
    }

    if let Commands::Ui { route, prepare } = &cli.command {
        return handle_ui(&config, route, *prepare).await;
    }

    let client = RemoteClient::connect(config.remote.bus, &config.remote.service_name)
        .await
        .context("Cannot reach autotunneld")?;

    match &cli.command {
        Commands::SaveTunnel { name, file } => {
            let text = read_config(file)?;
            client.save_tunnel(name, &text).await?;
            println!("Saved tunnel {}", name);
        }
        Commands::DeleteTunnel { name } => {
            client.delete_tunnel(name).await?;
            println!("Deleted tunnel {}", name);
        }
        Commands::SetPrimary { name } => {
            client.set_as_primary_tunnel(name).await?;
            println!("{} is now the primary tunnel", name);
        }
        Commands::SetTunnel { name, state } => {
            client.set_tunnel(name, state.enabled()).await?;
            println!("Tunnel {} {}", name, if state.enabled() { "started" } else { "stopped" });
        }
        Commands::AutoTunnel { state } => {
            client.set_auto_tunnel(state.enabled()).await?;
            print_switch("auto-tunnel", *state);
        }
        Commands::MobileData { state } => {
            client.set_tunnel_on_mobile_data(state.enabled()).await?;
            print_switch("tunnel-on-mobile-data", *state);
        }
        Commands::UntrustedWifi { state } => {
            client.set_tunnel_on_untrusted_wifi(state.enabled()).await?;
            print_switch("tunnel-on-untrusted-wifi", *state);
        }
        Commands::Ethernet { state } => {
            client.set_tunnel_on_ethernet(state.enabled()).await?;
            print_switch("tunnel-on-ethernet", *state);
        }
        Commands::StopOnNoInternet { state } => {
            client.set_stop_on_no_internet(state.enabled()).await?;
            print_switch("stop-on-no-internet", *state);
        }
        Commands::StartOnBoot { state } => {
            client.set_start_on_boot(state.enabled()).await?;
            print_switch("restore-on-boot", *state);
        }
        Commands::PrimaryName => match client.get_primary_tunnel_name().await? {
            Some(name) => println!("{}", name),
            None => println!("(none)"),
        },
        Commands::ListTunnels => {
            for name in client.list_tunnels().await? {
                println!("{}", name);
            }
        }
        Commands::Ui { .. } => unreachable!("handled above"),
    }
    Ok(())
}

fn print_switch(name: &str, state: Switch) {
    println!("{}: {}", name, if state.enabled() { "on" } else { "off" });
}

fn read_config(file: &PathBuf) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read configuration from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

async fn handle_ui(config: &AutoTunnelConfig, route: &str, prepare: bool) -> Result<()> {
    let store = Arc::new(JsonStateStore::new(config.state_file()));
    let deps = ShellDeps {
        preferences: store.clone(),
        repo: AppDataRepository::from_store(store),
        permission: Arc::new(NotificationPermission::detect().await),
        consent: Arc::new(PrivilegeConsent::new(config.consent.command.clone())),
        settings_uri: config.shell.settings_uri.clone(),
    };

    let mut shell = Shell::start(deps, LaunchOptions { prepare }).await;
    let frame = match shell.navigate(route).await {
        Ok(frame) => frame,
        Err(e) => bail!("Cannot show {}: {}", route, e),
    };

    print!("{}", frame);
    for snackbar in shell.drain_snackbars() {
        println!("* {}  [{}]", snackbar.message, snackbar.action_label);
    }
    Ok(())
}
