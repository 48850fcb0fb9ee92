//! Provisioning simulator
//!
//! Runs the provisioning core with an in-memory radio and station, and drives
//! it from a scripted companion app over a loopback link.

mod app;
mod connectivity;
mod device;
mod link;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use prov_manager::{startup, Boot, Config, HandlerKind, Manager, ProvisioningState, SecurityLevel, Status};
use prov_mcu::{endpoints, Radio, Station, WifiStatus, SERVICE_UUID_LE};

use app::Companion;
use connectivity::Connectivity;
use device::{FileStorage, MemRadio, Network, SimStation};
use link::LinkSession;

#[derive(Parser)]
#[command(name = "prov-sim")]
#[command(about = "Simulate WiFi provisioning of a device")]
struct Cli {
    /// Config file (default: $PROV_HOME/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Require a proof-of-possession handshake with this secret
    #[arg(long, global = true)]
    pop: Option<String>,
    /// Connection failures before provisioning starts over
    #[arg(long, global = true)]
    max_retries: Option<u32>,
    /// Never start over after connection failures
    #[arg(long, global = true)]
    no_retry_reset: bool,
    /// Keep the manager running after success
    #[arg(long, global = true)]
    reprovision: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the simulated device
    Provision {
        /// Network the companion app sends
        #[arg(short, long)]
        ssid: String,
        /// Passphrases to try, in order, one per attempt
        #[arg(short, long = "password", required = true)]
        passwords: Vec<String>,
        /// Passphrase the simulated access point accepts (default: last one tried)
        #[arg(long)]
        network_password: Option<String>,
        /// Service record sent to the structured-credential endpoint
        #[arg(long)]
        service: Option<String>,
        /// Forget earlier provisioning first
        #[arg(long)]
        reset: bool,
    },
    /// Connect, negotiate a session and query the device
    Probe {
        /// Input for the diagnostic endpoint
        #[arg(short, long, default_value = "0")]
        input: String,
    },
    /// Forget stored credentials
    Forget,
}

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let prov_home = prov_home()?;
    let config = load_config(&cli, &prov_home)?;
    let storage = FileStorage::new(prov_home.join("credentials.json"));

    match cli.command {
        Commands::Provision { ssid, passwords, network_password, service, reset } => {
            let network = Network {
                ssid: ssid.clone(),
                password: network_password.unwrap_or_else(|| passwords.last().cloned().unwrap_or_default()),
            };
            let config = Config { reset_provisioned: reset || config.reset_provisioned, ..config };
            provision(config, network, storage, &ssid, &passwords, service.as_deref()).await
        }
        Commands::Probe { input } => probe(config, &input).await,
        Commands::Forget => {
            let mut storage = storage;
            prov_mcu::Storage::clear(&mut storage)?;
            println!("Stored credentials removed");
            Ok(())
        }
    }
}

fn prov_home() -> anyhow::Result<PathBuf> {
    match std::env::var("PROV_HOME") {
        Ok(home) => Ok(PathBuf::from(home)),
        Err(_) => Ok(dirs::home_dir().context("could not determine home directory")?.join(".prov")),
    }
}

/// Config file if present, then command line overrides
fn load_config(cli: &Cli, prov_home: &std::path::Path) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let path = prov_home.join("config.json");
            if path.exists() {
                Config::load(&path).with_context(|| format!("loading {}", path.display()))?
            } else {
                Config::default()
            }
        }
    };

    if let Some(pop) = &cli.pop {
        config.security.level = SecurityLevel::Secured;
        config.security.pop = Some(pop.clone());
    }
    if let Some(max_retries) = cli.max_retries {
        config.retry.max_retries = max_retries;
    }
    if cli.no_retry_reset {
        config.retry.reset_on_failure = false;
    }
    if cli.reprovision {
        config.reprovision = true;
    }

    config.validate()?;
    Ok(config)
}

fn endpoint_for(config: &Config, kind: HandlerKind) -> Option<String> {
    config.endpoints.iter().find(|ep| ep.handler == kind).map(|ep| ep.name.clone())
}

/// Device with its manager running and a companion app connected
struct Rig {
    manager: Arc<Manager>,
    app: Companion<DuplexStream>,
    event_loop: tokio::task::JoinHandle<()>,
    connectivity: tokio::task::JoinHandle<Connectivity<MemRadio, SimStation, FileStorage>>,
}

async fn boot(config: Config, network: Network, storage: FileStorage) -> anyhow::Result<Rig> {
    let station = SimStation::new(network);
    let mut radio = MemRadio::default();

    let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
    let (manager, event_loop) = Manager::new(config, handoff_tx)?;

    let name = manager.service_name(&station.mac());
    radio.start_advertising(&name, &SERVICE_UUID_LE)?;
    for ep in endpoints::ALL.iter().map(|s| s.to_string()).chain(manager.endpoint_names()) {
        radio.add_endpoint(&ep)?;
    }

    let mut status = manager.subscribe();
    let connectivity = Connectivity::new(radio, station, storage, manager.events());
    let connectivity = tokio::spawn(connectivity.run(handoff_rx));
    let event_loop = tokio::spawn(event_loop.run());

    manager.start();
    status.wait_for(|s| s.state == ProvisioningState::Started).await?;

    let (device_end, app_end) = tokio::io::duplex(4096);
    let link = LinkSession::new(device_end, manager.clone());
    tokio::spawn(async move {
        if let Err(e) = link.run().await {
            log::error!("link error: {e}");
        }
    });

    let session_id: u32 = rand::random();
    let mut app = Companion::connect(app_end, session_id).await?;
    let level = manager.config().security.level;
    app.establish(level, manager.config().security.pop.as_deref()).await?;

    Ok(Rig { manager, app, event_loop, connectivity })
}

async fn provision(
    config: Config,
    network: Network,
    mut storage: FileStorage,
    ssid: &str,
    passwords: &[String],
    service: Option<&str>,
) -> anyhow::Result<()> {
    if let Boot::Provisioned(credentials) = startup::check(&config, &mut storage)? {
        let mut station = SimStation::new(network);
        station.apply(&credentials)?;
        match station.status() {
            WifiStatus::Connected => println!("Already provisioned, connected to {}", credentials.ssid),
            other => println!("Already provisioned for {}, station is {other:?}", credentials.ssid),
        }
        return Ok(());
    }

    let service_endpoint = endpoint_for(&config, HandlerKind::ServiceCredentials);
    let Rig { manager, mut app, event_loop, connectivity } = boot(config, network, storage).await?;

    if let Some(record) = service {
        let endpoint = service_endpoint.context("no structured-credential endpoint configured")?;
        let out = app.request(&endpoint, record.as_bytes()).await?;
        info!("{endpoint}: {}", app::text(&out));
    }

    let level = manager.config().security.level;
    let mut status = manager.subscribe();
    let mut provisioned = false;
    for password in passwords {
        let retries = status.borrow().retries;
        app.send_credentials(ssid, password).await?;

        let outcome: Status = *tokio::time::timeout(
            TIMEOUT,
            status.wait_for(|s| match s.state {
                ProvisioningState::Succeeded
                | ProvisioningState::Ended
                | ProvisioningState::Idle
                | ProvisioningState::Started => true,
                ProvisioningState::Failed => s.retries > retries,
                _ => false,
            }),
        )
        .await
        .context("timed out waiting for the station")??;

        match outcome.state {
            ProvisioningState::Idle | ProvisioningState::Started => {
                println!("Retries exhausted, provisioning starts over");
                status.wait_for(|s| s.state == ProvisioningState::Started).await?;
                app.reconnect(rand::random()).await?;
                app.establish(level, manager.config().security.pop.as_deref()).await?;
            }
            ProvisioningState::Failed => {
                let reason = outcome.last_failure.map(|r| r.describe()).unwrap_or("unknown");
                println!("Attempt failed: {reason} ({} so far)", outcome.retries);
            }
            _ => {
                provisioned = true;
                break;
            }
        }
    }

    if !provisioned {
        bail!("no passphrase left to try");
    }

    if manager.config().reprovision {
        manager.stop();
    }
    app.disconnect().await?;
    tokio::time::timeout(TIMEOUT, event_loop).await.context("provisioning did not end")??;
    let connectivity = connectivity.await?;

    let ip = connectivity.station.ip_info().map(|ip| ip.ip_str()).unwrap_or_default();
    println!("Provisioned {ssid} ({ip})");
    if let Some(service) = connectivity.station.service() {
        println!("Service endpoint {}:{}", service.ip, service.p);
    }
    Ok(())
}

async fn probe(config: Config, input: &str) -> anyhow::Result<()> {
    let diagnostic = endpoint_for(&config, HandlerKind::Diagnostic);
    let network = Network { ssid: String::new(), password: String::new() };
    let storage = FileStorage::new(std::env::temp_dir().join("prov-sim-probe.json"));
    let Rig { manager, mut app, .. } = boot(config, network, storage).await?;

    let version = app.version().await?;
    println!("proto-ver: {} (sec_ver {}, cap {:?})", version.prov.ver, version.prov.sec_ver, version.prov.cap);

    if let Some(endpoint) = diagnostic {
        println!("{endpoint}: {}", app.diagnostic(&endpoint, input.as_bytes()).await?);
    }

    println!("service uuid: {}", prov_mcu::service_uuid());
    let status = app.config(prov_proto::ConfigRequest::new("status")).await?;
    println!("status: {}", status.data.unwrap_or_default());
    println!("endpoints: {}", manager.endpoint_names().join(", "));

    app.disconnect().await?;
    Ok(())
}
