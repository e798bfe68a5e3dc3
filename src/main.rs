//! Sinain — real-time activity-awareness hub
//!
//! `sinain serve` runs the hub: ingress HTTP + overlay socket on one port,
//! the tick engine, and the escalation pipeline. `sinain status` queries a
//! running hub's /health.

mod hub;

use clap::{Parser, Subcommand};
use sinain_core::HubConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sinain", about = "Sinain activity-awareness hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub (default)
    Serve {
        /// Config file path (default: ~/.sinain/sinain.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Query a running hub's health endpoint
    Status {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        None => {
            let config = HubConfig::discover();
            hub::run(config).await
        }
        Some(Commands::Serve { config, port }) => {
            let mut config = match config {
                Some(path) => HubConfig::load(&path),
                None => HubConfig::discover(),
            };
            if let Some(port) = port {
                config.ws_port = Some(port);
            }
            hub::run(config).await
        }
        Some(Commands::Status { port }) => {
            let port = port.unwrap_or_else(|| HubConfig::discover().ws_port());
            let url = format!("http://127.0.0.1:{}/health", port);
            let response = reqwest::get(&url).await?;
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Some(Commands::Version) => {
            println!("sinain {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
