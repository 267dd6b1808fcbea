/// Money Flow Index (MFI) - volume-weighted RSI over typical price
///
/// Raw money flow is `hlc3 * volume`; it counts as positive when the typical
/// price rose from the previous bar and negative when it fell. The index is
/// `100 * positive / (positive + negative)` over a rolling `period` window.

use crate::models::Candle;

pub fn mfi_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let typical: Vec<f64> = candles.iter().map(Candle::hlc3).collect();

    // Signed flows per bar; bar 0 has no direction
    let mut positive = vec![0.0; candles.len()];
    let mut negative = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let flow = typical[i] * candles[i].volume;
        if typical[i] > typical[i - 1] {
            positive[i] = flow;
        } else if typical[i] < typical[i - 1] {
            negative[i] = flow;
        }
    }

    for i in period..candles.len() {
        let window = i + 1 - period..=i;
        let pos: f64 = positive[window.clone()].iter().sum();
        let neg: f64 = negative[window].iter().sum();
        let total = pos + neg;
        out[i] = Some(if total == 0.0 { 50.0 } else { 100.0 * pos / total });
    }

    out
}

/// Rescale MFI for display: `mfi * multiplier - offset`
pub fn scale_mfi(mfi: f64, multiplier: f64, offset: f64) -> f64 {
    mfi * multiplier - offset
}
