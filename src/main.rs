//! Service gateway binary.
//!
//! ```text
//!                  ┌────────────────────────────────────────────────────────┐
//!                  │                    SERVICE GATEWAY                     │
//!   Client         │  ┌──────────┐   ┌─────────────┐   ┌────────────────┐   │
//!   ───────────────┼─▶│ throttle │──▶│ request log │──▶│  proxy handler │   │
//!                  │  └──────────┘   └─────────────┘   └───────┬────────┘   │
//!                  │                                           ▼            │
//!                  │                                  ┌──────────────────┐  │
//!                  │                                  │ServiceDispatcher │  │
//!                  │                                  │ retry → breaker  │──┼──▶ orders
//!                  │                                  │   → timeout      │──┼──▶ payments
//!                  │                                  └──────────────────┘  │
//!                  └────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::{load_config, GatewayConfig};
use service_gateway::lifecycle::{wait_for_signal, Shutdown};
use service_gateway::observability::{logging, metrics};
use service_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "service-gateway")]
#[command(about = "Resilient API gateway for named downstream services", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");

    match &args.config {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file given, using defaults"),
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        rate_limit = config.rate_limit.enabled,
        "Configuration summary"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        });
    }

    let server = GatewayServer::new(config);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
