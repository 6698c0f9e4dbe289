use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod assets;
mod config;
mod error;
mod exchange;
mod monitor;
mod rate_limiter;
mod report;
mod scheduler;
mod shutdown;
mod simulation;

use assets::{spawn_reloader, AssetLoader, SharedAssets};
use config::EngineConfig;
use exchange::{build_source, ExchangeId, PriceSource, RestClient};
use report::{FanoutSink, JsonlSink, ReportSink, TracingSink};
use scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "cex-arb-monitor")]
#[command(about = "Cross-exchange arbitrage opportunity monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every exchange pair until Ctrl+C (default)
    Monitor,

    /// Validate configuration and the asset file, then exit
    CheckConfig,
}

/// RUST_LOG picks the filter (default `info`); LOG_FORMAT=json switches to
/// JSON lines.
fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = FmtSubscriber::builder().with_env_filter(filter);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// One REST adapter per supported exchange, all on a shared HTTP client
fn build_sources(config: &EngineConfig, client: &RestClient) -> HashMap<String, Arc<dyn PriceSource>> {
    ExchangeId::ALL
        .iter()
        .map(|id| {
            let fee = config
                .fee_for(id.name())
                .unwrap_or_else(|| id.default_fee_percent());
            (id.name().to_string(), build_source(*id, client.clone(), fee))
        })
        .collect()
}

/// Load config and assets, then assemble the scheduler
fn prepare() -> Result<(EngineConfig, AssetLoader, SharedAssets, Scheduler)> {
    let config = EngineConfig::from_env()?;
    config.log_config();

    let loader = AssetLoader::new(config.asset_files.clone(), &config.allowed_quotes);
    let catalog = loader.load()?;
    info!(
        "Loaded {} assets across {} pairs from {}",
        catalog.asset_count(),
        catalog.pairs().count(),
        config.asset_files.assets.display()
    );
    let assets = SharedAssets::new(catalog);

    let client = RestClient::new(config.fetch_timeout)?;
    let sources = build_sources(&config, &client);

    let sinks: Vec<Arc<dyn ReportSink>> = vec![
        Arc::new(TracingSink),
        Arc::new(JsonlSink::new(&config.report_dir)?),
    ];
    let sink: Arc<dyn ReportSink> = Arc::new(FanoutSink::new(sinks));

    let scheduler = Scheduler::new(&config, sources, assets.clone(), sink)?;
    Ok((config, loader, assets, scheduler))
}

async fn run_monitor() -> Result<()> {
    let (config, loader, assets, scheduler) = prepare()?;
    let (trigger, shutdown) = shutdown::channel();

    let reloader = config
        .assets_reload
        .map(|every| spawn_reloader(loader, assets, every, shutdown.clone()));

    let running = tokio::spawn(scheduler.run(shutdown));

    info!("Monitoring started. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    trigger.trigger();

    running.await?;
    if let Some(handle) = reloader {
        handle.await?;
    }
    info!("Stopped");
    Ok(())
}

fn run_check_config() -> Result<()> {
    let (_, _, _, scheduler) = prepare()?;
    let pairs: Vec<String> = scheduler.pairs().map(|p| p.key()).collect();
    info!("Configuration OK, {} pairs: {}", pairs.len(), pairs.join(", "));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Monitor) | None => run_monitor().await,
        Some(Commands::CheckConfig) => run_check_config(),
    }
}
