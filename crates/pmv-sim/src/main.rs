//! pmv-sim - Entry Point

use anyhow::Result;
use clap::Parser;
use pmv_sim::SimConfig;
use tracing::info;

/// Replay vault router sizing and spread tables
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PMV_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Append the Prometheus metrics recorded during the replay
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > PMV_CONFIG env var > built-in defaults
    let config_path = args.config.or_else(|| std::env::var("PMV_CONFIG").ok());
    let config = match &config_path {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };

    // Filter and format come from the config
    pmv_telemetry::init_logging(&config.logging)?;

    info!("Starting pmv-sim v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No configuration given, using defaults"),
    }

    let report = pmv_sim::build_report(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", pmv_sim::render_text(&report, config.unit));
    }

    if args.metrics {
        print!("{}", pmv_telemetry::Metrics::render()?);
    }
    Ok(())
}
