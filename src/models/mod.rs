use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick data for one bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Typical price (high + low + close) / 3
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Trading signal
///
/// `Buy` opens a long, `Sell` opens a short.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn opposite(self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    /// Wire form used by the exchange
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TIMEFRAMES: &[(&str, i64)] = &[
    ("1m", 60),
    ("3m", 3 * 60),
    ("5m", 5 * 60),
    ("15m", 15 * 60),
    ("30m", 30 * 60),
    ("1h", 3600),
    ("2h", 2 * 3600),
    ("4h", 4 * 3600),
    ("6h", 6 * 3600),
    ("8h", 8 * 3600),
    ("12h", 12 * 3600),
    ("1d", 86_400),
    ("3d", 3 * 86_400),
    ("1w", 7 * 86_400),
    ("1M", 30 * 86_400),
];

/// Kline interval accepted by Binance Futures (e.g. "15m", "4h")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(String);

impl Timeframe {
    pub fn one_minute() -> Self {
        Self("1m".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nominal bar length. "1M" counts as 30 days.
    pub fn duration(&self) -> Duration {
        let secs = TIMEFRAMES
            .iter()
            .find(|(name, _)| *name == self.0)
            .map(|(_, secs)| *secs)
            .unwrap_or(60);
        Duration::seconds(secs)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if TIMEFRAMES.iter().any(|(name, _)| *name == s) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("unsupported timeframe '{}'", s))
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trading pair as written in the config ("BTC/USDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange form with the separator removed ("BTCUSDT")
    pub fn exchange_symbol(&self) -> String {
        self.0.replace('/', "")
    }

    /// Quote asset, "USDT" for "BTC/USDT". Falls back to USDT for unseparated symbols.
    pub fn quote_asset(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or("USDT")
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if let Some((base, quote)) = trimmed.split_once('/') {
            if base.is_empty() || quote.is_empty() {
                return Err(format!("malformed symbol '{}'", s));
            }
        }
        Ok(Self(trimmed.to_uppercase()))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
