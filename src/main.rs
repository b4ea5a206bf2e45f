//! CLI for FleetCast
//!
//! Subcommands:
//! - `serve`: run the WebSocket server (the default)
//! - `check-config`: load and validate configuration, print the result

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fleetcast::broker::Broker;
use fleetcast::config::{Settings, load_config_from};
use fleetcast::transport::websocket::start_websocket_server;
use fleetcast::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fleetcast", version, about)]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, env = "FLEETCAST_CONFIG_FILE", default_value = "config/default")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket server
    Serve,
    /// Load and validate configuration, then print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(settings).await,
        Command::CheckConfig => print_settings(&settings),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = settings.bind_addr();
    let broker = Arc::new(Broker::new(settings.batch));
    broker.start();

    let outcome = tokio::select! {
        served = start_websocket_server(&addr, broker.clone()) => {
            served.map_err(Into::into)
        }
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Flushing and exiting.");
            signal.map_err(Into::into)
        }
    };

    broker.shutdown().await;
    outcome
}

fn print_settings(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
