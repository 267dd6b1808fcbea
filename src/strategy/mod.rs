// Trading strategy module
pub mod signals;
pub mod wavetrend;

pub use signals::{SignalConfig, SignalSnapshot};
pub use wavetrend::WaveTrendStrategy;

use crate::models::{Candle, Signal};
use crate::Result;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Indicator readings and the signal for the latest bar
    fn evaluate(&self, candles: &[Candle]) -> Result<SignalSnapshot>;

    /// Generate a trading signal based on market data
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        Ok(self.evaluate(candles)?.signal)
    }

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
