/// WaveTrend oscillator (LazyBear)
///
/// - esa = EMA(hlc3, channel_len)
/// - de  = EMA(|hlc3 - esa|, channel_len)
/// - ci  = (hlc3 - esa) / (0.015 * de)
/// - wt1 = EMA(ci, average_len)
/// - wt2 = SMA(wt1, ma_len)
///
/// Readings above +60 are overbought, below -60 oversold.

use super::moving_average::{ema_series, sma_series};
use crate::models::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct WaveTrend {
    pub wt1: Vec<Option<f64>>,
    pub wt2: Vec<Option<f64>>,
    /// wt1 - wt2
    pub wt_vwap: Vec<Option<f64>>,
}

pub fn calculate_wavetrend(
    candles: &[Candle],
    channel_len: usize,
    average_len: usize,
    ma_len: usize,
) -> WaveTrend {
    let src: Vec<Option<f64>> = candles.iter().map(|c| Some(c.hlc3())).collect();
    let esa = ema_series(&src, channel_len);

    let deviation: Vec<Option<f64>> = src
        .iter()
        .zip(&esa)
        .map(|(s, e)| Some((s.as_ref()? - e.as_ref()?).abs()))
        .collect();
    let de = ema_series(&deviation, channel_len);

    let ci: Vec<Option<f64>> = src
        .iter()
        .zip(esa.iter().zip(&de))
        .map(|(s, (e, d))| {
            let d = (*d)?;
            if d == 0.0 {
                return None;
            }
            Some(((*s)? - (*e)?) / (0.015 * d))
        })
        .collect();

    let wt1 = ema_series(&ci, average_len);
    let wt2 = sma_series(&wt1, ma_len);
    let wt_vwap = wt1
        .iter()
        .zip(&wt2)
        .map(|(a, b)| Some((*a)? - (*b)?))
        .collect();

    WaveTrend { wt1, wt2, wt_vwap }
}
