use super::{
    signals::{analyze, SignalConfig, SignalSnapshot},
    Strategy,
};
use crate::models::Candle;
use crate::Result;

/// WaveTrend cross strategy
///
/// Goes long when wt1 crosses above wt2 in oversold territory, short when it
/// crosses below in overbought territory. A buy is suppressed when the
/// "gold" bullish divergence setup is present on the same bar.
#[derive(Debug, Clone, Default)]
pub struct WaveTrendStrategy {
    config: SignalConfig,
}

impl WaveTrendStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }
}

impl Strategy for WaveTrendStrategy {
    fn evaluate(&self, candles: &[Candle]) -> Result<SignalSnapshot> {
        analyze(candles, &self.config)
    }

    fn name(&self) -> &str {
        "WaveTrend"
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles()
    }
}
