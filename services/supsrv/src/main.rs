//! Supervisor service entry point

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use fission_comlink::transport::MemoryHub;
use fission_config::{ConfigLoader, SupervisorConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use supsrv::comms;
use supsrv::SupervisorCore;

#[derive(Debug, Parser)]
#[command(name = "supsrv", about = "FissionSCADA facility supervisor")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/supsrv.yaml")]
    config: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn init_logging(config: &SupervisorConfig) {
    let default_level = if config.log.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: SupervisorConfig = ConfigLoader::new()
        .with_env_prefix("SUPSRV")
        .with_yaml_file(&args.config)
        .build()?;

    init_logging(&config);
    info!(
        "supervisor {} starting at {}",
        supsrv::SUPERVISOR_VERSION,
        chrono::Utc::now().to_rfc3339()
    );

    // Invalid configuration refuses startup and directs the operator to
    // the configurator
    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("config: {}", warning);
    }
    if !validation.is_valid {
        for err in &validation.errors {
            error!("config: {}", err);
        }
        bail!("configuration invalid, run the configurator before startup");
    }
    if args.check {
        info!("configuration valid");
        return Ok(());
    }

    // The platform modem glue attaches here; the in-process hub serves
    // bench simulation runs out of the box
    let hub = MemoryHub::new();
    let transport = Arc::new(hub.endpoint());

    // Peripheral manager events (device attach/detach) feed this channel
    let (_peripheral_tx, peripheral_rx) = mpsc::channel(64);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown_signal.cancel();
        }
    });

    let mut core = SupervisorCore::new(config);
    comms::supervise(&mut core, transport, peripheral_rx, shutdown).await;

    info!("supervisor stopped");
    Ok(())
}
