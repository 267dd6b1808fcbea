// Bot configuration
// JSON file on disk, WAVEBOT_* environment overrides, credentials from env

use crate::models::{Symbol, Timeframe};
use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const ENV_PREFIX: &str = "WAVEBOT";

/// Top-level bot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<Symbol>,
    pub timeframes: Vec<Timeframe>,
    pub strategy: StrategyConfig,
    pub indicators: IndicatorConfig,
    pub runtime: RuntimeConfig,
}

/// Position sizing, brackets and WaveTrend thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub leverage: u32,
    pub fixed_size_usd: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub ob_level: f64,
    pub os_level: f64,
    pub os_level3: f64,
    pub wt_div_ob: f64,
    pub wt_div_os: f64,
    /// Fee charged per side, as a fraction of notional
    pub commission_pct: f64,
    /// Brackets further than this from entry get pulled in
    pub max_bracket_distance_pct: f64,
    /// Prices below this are treated as bad data (no entry, no brackets)
    pub min_price: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            leverage: 10,
            fixed_size_usd: 50.0,
            sl_pct: 0.025,
            tp_pct: 0.07,
            ob_level: 20.0,
            os_level: -20.0,
            os_level3: -75.0,
            wt_div_ob: 45.0,
            wt_div_os: -65.0,
            commission_pct: 0.0004, // 0.04% per side
            max_bracket_distance_pct: 0.05,
            min_price: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub wt_channel_len: usize,
    pub wt_average_len: usize,
    pub wt_ma_len: usize,
    pub rsi_length: usize,
    pub rsi_oversold: f64,
    pub mfi_period: usize,
    pub mfi_multiplier: f64,
    pub mfi_offset: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            wt_channel_len: 9,
            wt_average_len: 12,
            wt_ma_len: 3,
            rsi_length: 14,
            rsi_oversold: 30.0,
            mfi_period: 60,
            mfi_multiplier: 150.0,
            mfi_offset: 2.5,
        }
    }
}

/// Loop timings and I/O
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub poll_interval_secs: u64,
    pub cooldown_minutes: i64,
    pub kline_limit: u32,
    pub position_confirm_delay_ms: u64,
    pub bracket_attempts: u32,
    pub bracket_retry_delay_ms: u64,
    pub log_file: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            cooldown_minutes: 30,
            kline_limit: 100,
            position_confirm_delay_ms: 1000,
            bracket_attempts: 2,
            bracket_retry_delay_ms: 2000,
            log_file: PathBuf::from("trades.log"),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTC/USDT"].iter().filter_map(|s| s.parse().ok()).collect(),
            timeframes: ["15m", "30m", "1h", "2h", "4h", "6h"]
                .iter()
                .filter_map(|tf| tf.parse().ok())
                .collect(),
            strategy: StrategyConfig::default(),
            indicators: IndicatorConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load config from a JSON file, falling back to defaults when the file is absent
    ///
    /// Runs before logging is set up, so a missing file is left to the caller to report.
    ///
    /// Environment variables override file values, e.g.
    /// `WAVEBOT_STRATEGY__LEVERAGE=5` or `WAVEBOT_RUNTIME__POLL_INTERVAL_SECS=30`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .with_context(|| format!("Config path {} is not valid UTF-8", path.display()))?;

        let settings = Config::builder()
            .add_source(File::new(path_str, FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let cfg: BotConfig = settings
            .try_deserialize()
            .context("Failed to parse bot configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse config from a JSON string (no env overrides)
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: BotConfig = serde_json::from_str(json).context("Invalid config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("At least one symbol must be configured");
        }
        if self.timeframes.is_empty() {
            anyhow::bail!("At least one timeframe must be configured");
        }

        let s = &self.strategy;
        if !(1..=125).contains(&s.leverage) {
            anyhow::bail!("Leverage must be between 1 and 125, got {}", s.leverage);
        }
        if s.fixed_size_usd <= 0.0 {
            anyhow::bail!("fixed_size_usd must be positive, got {}", s.fixed_size_usd);
        }
        for (name, value) in [
            ("sl_pct", s.sl_pct),
            ("tp_pct", s.tp_pct),
            ("max_bracket_distance_pct", s.max_bracket_distance_pct),
        ] {
            if value <= 0.0 || value >= 1.0 {
                anyhow::bail!("{} must be in (0, 1), got {}", name, value);
            }
        }
        if s.commission_pct < 0.0 || s.commission_pct >= 1.0 {
            anyhow::bail!("commission_pct must be in [0, 1), got {}", s.commission_pct);
        }
        if s.os_level > s.ob_level {
            anyhow::bail!(
                "os_level ({}) must not exceed ob_level ({})",
                s.os_level,
                s.ob_level
            );
        }

        let i = &self.indicators;
        for (name, value) in [
            ("wt_channel_len", i.wt_channel_len),
            ("wt_average_len", i.wt_average_len),
            ("wt_ma_len", i.wt_ma_len),
            ("rsi_length", i.rsi_length),
            ("mfi_period", i.mfi_period),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be at least 1", name);
            }
        }

        if self.runtime.kline_limit < 2 {
            anyhow::bail!("kline_limit must be at least 2");
        }
        if self.runtime.bracket_attempts == 0 {
            anyhow::bail!("bracket_attempts must be at least 1");
        }

        Ok(())
    }
}

/// Exchange API credentials
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

impl Credentials {
    /// Read BINANCE_API_KEY / BINANCE_API_SECRET / BINANCE_TESTNET
    ///
    /// Call `dotenvy::dotenv()` beforehand to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} not found in environment", key))
        };

        let testnet = match lookup("BINANCE_TESTNET") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("BINANCE_TESTNET must be true/false, got '{}'", v))?,
            None => true,
        };

        Ok(Self {
            api_key: required("BINANCE_API_KEY")?,
            api_secret: required("BINANCE_API_SECRET")?,
            testnet,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("testnet", &self.testnet)
            .finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
