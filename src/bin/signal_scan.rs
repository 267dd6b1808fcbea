use clap::Parser;
use std::path::PathBuf;
use wavebot::api::{BinanceFuturesClient, Exchange};
use wavebot::config::{BotConfig, DEFAULT_CONFIG_PATH};
use wavebot::strategy::signals::{validate_candle_uniformity, SignalConfig};
use wavebot::strategy::{Strategy, WaveTrendStrategy};
use wavebot::Result;

/// Print WaveTrend/RSI/MFI readings for every configured symbol and timeframe
/// without placing orders. Uses public market data only.
#[derive(Debug, Parser)]
#[command(about)]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("wavebot=warn")
        .init();

    let args = Args::parse();
    let config = BotConfig::load(&args.config)?;
    if !args.config.exists() {
        tracing::warn!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
    }
    let client = BinanceFuturesClient::public()?;
    let strategy = WaveTrendStrategy::new(SignalConfig::from_config(&config));

    println!("\n╔══════════════════════════════════════════════════════╗");
    println!("║     WAVETREND SIGNAL SCAN                            ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    for symbol in &config.symbols {
        println!("═══════════════════════════════════════════════════════");
        println!("{}", symbol);
        println!("═══════════════════════════════════════════════════════\n");

        for timeframe in &config.timeframes {
            let candles = match client
                .fetch_klines(symbol, timeframe, config.runtime.kline_limit)
                .await
            {
                Ok(c) if !c.is_empty() => c,
                Ok(_) => {
                    println!("⚠️  [{}@{}] no data\n", symbol, timeframe);
                    continue;
                }
                Err(e) => {
                    println!("❌ [{}@{}] {}\n", symbol, timeframe, e);
                    continue;
                }
            };

            if let Err(e) = validate_candle_uniformity(&candles, timeframe.duration()) {
                println!("⚠️  {}", e);
            }

            match strategy.evaluate(&candles) {
                Ok(s) => {
                    println!("[{}@{}]", symbol, timeframe);
                    println!("  Price: {:.2}", s.price);
                    println!(
                        "  WT2: {}, WT1: {} (cross_up: {}, cross_down: {})",
                        fmt_opt(s.wt2),
                        fmt_opt(s.wt1),
                        s.cross_up,
                        s.cross_down
                    );
                    println!(
                        "  Divergences - Bull: {}, Bear: {}",
                        s.bullish_divergence, s.bearish_divergence
                    );
                    println!("  Gold: {}", s.gold);
                    println!("  RSI: {}", fmt_opt(s.rsi));
                    println!("  MFI: {}", fmt_opt(s.mfi));
                    println!("  Signal: {:?}\n", s.signal);
                }
                Err(e) => println!("❌ [{}@{}] {}\n", symbol, timeframe, e),
            }
        }
    }

    Ok(())
}
