use binance_collector::cli::{Cli, Commands};
use binance_collector::config::Config;
use clap::Parser;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Config file {} not found, using defaults", cli.config);
        Config::from_env()?
    };

    // Initialize telemetry
    binance_collector::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Collect(args) => {
            tracing::info!("Starting collectors");
            args.execute(&config).await?;
        }
        Commands::Update(args) => {
            tracing::info!("Running single update");
            args.execute(&config).await?;
        }
        Commands::Sync(args) => {
            tracing::info!(from = %args.from, "Starting sync");
            args.execute(&config).await?;
        }
        Commands::Info(args) => {
            args.execute(&config).await?;
        }
    }

    Ok(())
}
