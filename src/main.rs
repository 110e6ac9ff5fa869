use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fleet_coordinator::api::{serve, AppState};
use fleet_coordinator::{FleetConfig, FleetCoordinator};

#[derive(Parser)]
#[command(name = "fleet-coordinator")]
#[command(about = "Agent fleet coordination engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator and its HTTP API
    Serve {
        #[arg(short, long, help = "TOML or YAML config file")]
        config: Option<PathBuf>,

        #[arg(short, long, help = "Override the API port")]
        port: Option<u16>,
    },
    /// Load and validate a config file, then print the effective config
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => run_server(config, port).await?,
        Commands::CheckConfig { config } => check_config(config)?,
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<FleetConfig> {
    match path {
        Some(path) => FleetConfig::load(&path),
        None => FleetConfig::from_env(),
    }
}

async fn run_server(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let config = load_config(config_path)?;
    let port = port.unwrap_or(config.api_port);

    let coordinator = FleetCoordinator::with_defaults(config)?;
    coordinator.restore_state().await;
    let initialized = coordinator.initialize().await?;
    log::info!(
        "Fleet {} initialized: {} pools spawned, topology {}",
        coordinator.config().fleet_id,
        initialized.spawned.len(),
        initialized.topology.mode
    );
    coordinator.start();

    let state = AppState {
        coordinator: coordinator.clone(),
    };
    serve(state, port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
        }
        log::info!("Shutdown requested");
    })
    .await?;

    coordinator.shutdown().await;
    Ok(())
}

fn check_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("Configuration is valid");
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
