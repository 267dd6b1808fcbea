use crate::config::BotConfig;
use crate::indicators::{
    calculate_wavetrend, find_divergences, gt, lt, mfi_series, rsi_series, scale_mfi,
};
use crate::models::{Candle, Signal};
use chrono::Duration;

/// Indicator lengths and WaveTrend thresholds used for signal generation
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub wt_channel_len: usize,
    pub wt_average_len: usize,
    pub wt_ma_len: usize,
    pub rsi_length: usize,
    pub rsi_oversold: f64,
    pub mfi_period: usize,
    pub mfi_multiplier: f64,
    pub mfi_offset: f64,
    pub ob_level: f64,  // cross-down must happen at or above this
    pub os_level: f64,  // cross-up must happen at or below this
    pub os_level3: f64, // "gold" extreme oversold line
    pub wt_div_ob: f64,
    pub wt_div_os: f64,
}

impl SignalConfig {
    pub fn from_config(cfg: &BotConfig) -> Self {
        let ind = &cfg.indicators;
        let strat = &cfg.strategy;
        Self {
            wt_channel_len: ind.wt_channel_len,
            wt_average_len: ind.wt_average_len,
            wt_ma_len: ind.wt_ma_len,
            rsi_length: ind.rsi_length,
            rsi_oversold: ind.rsi_oversold,
            mfi_period: ind.mfi_period,
            mfi_multiplier: ind.mfi_multiplier,
            mfi_offset: ind.mfi_offset,
            ob_level: strat.ob_level,
            os_level: strat.os_level,
            os_level3: strat.os_level3,
            wt_div_ob: strat.wt_div_ob,
            wt_div_os: strat.wt_div_os,
        }
    }

    /// Bars needed before wt2 is defined on the last two bars and their predecessors
    ///
    /// # Example
    /// ```
    /// use wavebot::strategy::signals::SignalConfig;
    ///
    /// let config = SignalConfig::default();
    /// // channel 9, average 12, ma 3
    /// assert_eq!(config.min_candles(), 32);
    /// ```
    pub fn min_candles(&self) -> usize {
        2 * self.wt_channel_len + self.wt_average_len + self.wt_ma_len - 1
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::from_config(&BotConfig::default())
    }
}

/// Indicator readings and flags for the latest bar
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSnapshot {
    pub price: f64,
    pub wt1: Option<f64>,
    pub wt2: Option<f64>,
    pub wt_vwap: Option<f64>,
    pub rsi: Option<f64>,
    /// Scaled MFI (`mfi * multiplier - offset`)
    pub mfi: Option<f64>,
    pub cross_up: bool,
    pub cross_down: bool,
    pub bullish_divergence: bool,
    pub bearish_divergence: bool,
    pub gold: bool,
    pub signal: Signal,
}

/// Validate that candles are uniformly spaced in time
///
/// # Tolerance
/// Allows up to 1.5x the expected interval
pub fn validate_candle_uniformity(candles: &[Candle], expected: Duration) -> anyhow::Result<()> {
    if candles.len() < 2 {
        return Ok(());
    }

    let expected_secs = expected.num_seconds();
    let max_gap_secs = expected_secs + expected_secs / 2;

    for window in candles.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff <= 0 {
            anyhow::bail!("Candles are not sorted by open time");
        }

        if time_diff > max_gap_secs {
            anyhow::bail!(
                "Data gap detected: {}s between candles (expected ~{}s, max allowed {}s). Gap from {} to {}",
                time_diff,
                expected_secs,
                max_gap_secs,
                window[0].open_time.format("%Y-%m-%d %H:%M"),
                window[1].open_time.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// Per-bar series the entry rules are evaluated on
#[derive(Debug, Clone)]
pub struct RuleSeries {
    pub wt1: Vec<Option<f64>>,
    pub wt2: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub bullish_divergence: Vec<bool>,
}

impl RuleSeries {
    /// wt1 crosses above wt2 with wt2 at or below `os_level`
    pub fn cross_up(&self, i: usize, config: &SignalConfig) -> bool {
        i >= 1
            && i < self.wt2.len()
            && lt(self.wt1[i - 1], self.wt2[i - 1])
            && gt(self.wt1[i], self.wt2[i])
            && self.wt2[i].is_some_and(|v| v <= config.os_level)
    }

    /// wt1 crosses below wt2 with wt2 at or above `ob_level`
    pub fn cross_down(&self, i: usize, config: &SignalConfig) -> bool {
        i >= 1
            && i < self.wt2.len()
            && gt(self.wt1[i - 1], self.wt2[i - 1])
            && lt(self.wt1[i], self.wt2[i])
            && self.wt2[i].is_some_and(|v| v >= config.ob_level)
    }

    /// Bullish divergence where wt2 climbed out of `os_level3` and RSI two
    /// bars back was below `rsi_oversold`
    pub fn gold(&self, i: usize, config: &SignalConfig) -> bool {
        i >= 2
            && self.bullish_divergence.get(i).copied().unwrap_or(false)
            && self.wt2[i - 2].is_some_and(|v| v <= config.os_level3)
            && self.wt2[i].is_some_and(|v| v > config.os_level3)
            && self
                .rsi
                .get(i - 2)
                .copied()
                .flatten()
                .is_some_and(|v| v < config.rsi_oversold)
    }

    pub fn buy(&self, i: usize, config: &SignalConfig) -> bool {
        self.cross_up(i, config) && !self.gold(i, config)
    }

    pub fn sell(&self, i: usize, config: &SignalConfig) -> bool {
        self.cross_down(i, config)
    }

    /// Buy if a buy printed on the last or previous bar, else Sell likewise, else Hold
    pub fn signal(&self, config: &SignalConfig) -> Signal {
        let len = self.wt2.len();
        if len < 2 {
            return Signal::Hold;
        }
        let (last, prev) = (len - 1, len - 2);

        if self.buy(last, config) || self.buy(prev, config) {
            Signal::Buy
        } else if self.sell(last, config) || self.sell(prev, config) {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

/// Compute WaveTrend/RSI/MFI over the candles and evaluate the entry rules
pub fn analyze(candles: &[Candle], config: &SignalConfig) -> anyhow::Result<SignalSnapshot> {
    let required = config.min_candles().max(2);
    if candles.len() < required {
        anyhow::bail!(
            "Insufficient data: {} candles, need {}",
            candles.len(),
            required
        );
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mfi = mfi_series(candles, config.mfi_period);
    let wt = calculate_wavetrend(
        candles,
        config.wt_channel_len,
        config.wt_average_len,
        config.wt_ma_len,
    );
    let divergences = find_divergences(&wt.wt2, &closes, config.wt_div_ob, config.wt_div_os);

    let last = candles.len() - 1;
    let wt_vwap = wt.wt_vwap[last];
    let series = RuleSeries {
        wt1: wt.wt1,
        wt2: wt.wt2,
        rsi: rsi_series(&closes, config.rsi_length),
        bullish_divergence: divergences.bullish,
    };

    Ok(SignalSnapshot {
        price: closes[last],
        wt1: series.wt1[last],
        wt2: series.wt2[last],
        wt_vwap,
        rsi: series.rsi[last],
        mfi: mfi[last].map(|m| scale_mfi(m, config.mfi_multiplier, config.mfi_offset)),
        cross_up: series.cross_up(last, config),
        cross_down: series.cross_down(last, config),
        bullish_divergence: series.bullish_divergence[last],
        bearish_divergence: divergences.bearish[last],
        gold: series.gold(last, config),
        signal: series.signal(config),
    })
}
