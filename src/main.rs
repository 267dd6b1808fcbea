use anyhow::Context;
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use wavebot::api::BinanceFuturesClient;
use wavebot::config::{BotConfig, Credentials, DEFAULT_CONFIG_PATH};
use wavebot::{Result, TradingBot};

const DEFAULT_LOG_FILTER: &str = "wavebot=info";

/// WaveTrend futures trading bot for Binance USD-M
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Append logs to this file instead of `runtime.log_file`
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = BotConfig::load(&args.config)?;
    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| config.runtime.log_file.clone());
    setup_logging(&log_file)?;

    if !args.config.exists() {
        tracing::warn!(
            "Config file {} not found, running with defaults",
            args.config.display()
        );
    }

    let credentials = Credentials::from_env()?;
    let network = if credentials.testnet { "testnet" } else { "LIVE" };

    tracing::info!("🚀 wavebot starting on Binance Futures {}", network);
    tracing::info!("\n📊 Configuration:");
    tracing::info!(
        "  Symbols: {}",
        config
            .symbols
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "  Timeframes: {}",
        config
            .timeframes
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "  Size: {} USDT @ {}x, SL {}% / TP {}% of margin",
        config.strategy.fixed_size_usd,
        config.strategy.leverage,
        config.strategy.sl_pct * 100.0,
        config.strategy.tp_pct * 100.0
    );
    tracing::info!("  Log file: {}", log_file.display());

    let client = Arc::new(BinanceFuturesClient::new(credentials)?);
    let mut bot = TradingBot::new(client, config);
    bot.startup().await?;

    if args.once {
        bot.run_cycle(chrono::Utc::now()).await;
        tracing::info!("Single cycle complete");
        return Ok(());
    }

    tracing::info!(
        "\nPolling every {}s. Press Ctrl+C to stop...\n",
        bot.config().runtime.poll_interval_secs
    );

    bot.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    })
    .await?;

    tracing::info!("👋 wavebot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

/// Log to stdout and append plain-text lines to `log_file`
fn setup_logging(log_file: &Path) -> Result<()> {
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(())
}
