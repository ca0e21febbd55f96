//! tunneld daemon entry point.
//!
//! Creates the TUN interface, loads the tunnel configuration message,
//! starts the tunnel, and runs until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tunneld::types::TUNNEL_INTERFACE;
use tunneld::{LoopbackEngine, ShellSettingsHost, StopReason, TunPacketFlow, TunnelProvider};

#[derive(Parser)]
#[command(name = "tunneld", version, about = "Packet tunnel adapter daemon")]
struct Cli {
    /// Path to the tunnel configuration message (JSON)
    #[arg(short, long)]
    message: PathBuf,

    /// Tunnel interface name
    #[arg(short, long, default_value = TUNNEL_INTERFACE)]
    interface: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    info!("--- Starting tunneld ---");

    match run(cli).await {
        Ok(()) => {
            info!("tunneld exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("tunneld error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let payload = tokio::fs::read(&cli.message)
        .await
        .with_context(|| format!("failed to read configuration message {:?}", cli.message))?;

    let flow = Arc::new(
        TunPacketFlow::create(&cli.interface)
            .context("failed to create TUN interface (are you running as root?)")?,
    );
    info!(interface = %flow.name(), "TUN interface created");

    let host = Arc::new(ShellSettingsHost::new(flow.name().to_string()));
    // Stand-in engine: echoes packets back to the interface. Deployments
    // link a real tunneling engine behind the same trait.
    let engine = Arc::new(LoopbackEngine::new());

    let provider = TunnelProvider::new(engine, flow, host);
    provider.handle_app_message(&payload);
    provider.start_tunnel().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("interrupt received, shutting down");
    provider.stop_tunnel(StopReason::Requested).await;

    Ok(())
}
