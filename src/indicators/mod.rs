// Technical indicators module
// Implements EMA/SMA, RSI, MFI, WaveTrend and fractal divergences
//
// Series functions return one entry per input bar; `None` marks bars
// without enough history.

pub mod divergence;
pub mod mfi;
pub mod moving_average;
pub mod rsi;
pub mod wavetrend;

pub use divergence::{find_divergences, Divergences};
pub use mfi::{mfi_series, scale_mfi};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
pub use wavetrend::{calculate_wavetrend, WaveTrend};

/// `a < b`, false when either side is missing
pub(crate) fn lt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a < b)
}

/// `a > b`, false when either side is missing
pub(crate) fn gt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a > b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values_compare_false() {
        assert!(lt(Some(1.0), Some(2.0)));
        assert!(!lt(None, Some(2.0)));
        assert!(!gt(Some(3.0), None));
        assert!(!gt(None, None));
    }
}
