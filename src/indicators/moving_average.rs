/// Exponential Moving Average over a series with gaps
///
/// Leading `None`s are skipped. The EMA is seeded with the SMA of the first
/// `period` present values, then updated with `2 / (period + 1)`. A `None`
/// after seeding produces `None` at that index without resetting the state.
pub fn ema_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut seed_sum = 0.0;
    let mut seen = 0;
    let mut ema: Option<f64> = None;

    for (i, value) in values.iter().enumerate() {
        let Some(x) = *value else { continue };

        match ema {
            None => {
                seed_sum += x;
                seen += 1;
                if seen == period {
                    let seed = seed_sum / period as f64;
                    ema = Some(seed);
                    out[i] = Some(seed);
                }
            }
            Some(prev) => {
                let next = (x - prev) * multiplier + prev;
                ema = Some(next);
                out[i] = Some(next);
            }
        }
    }

    out
}

/// Rolling Simple Moving Average, `None` while any value in the window is missing
pub fn sma_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let sum: Option<f64> = window.iter().copied().sum();
        out[i] = sum.map(|s| s / period as f64);
    }

    out
}

/// Calculate Simple Moving Average (SMA)
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA), last value only
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    let values: Vec<Option<f64>> = prices.iter().copied().map(Some).collect();
    ema_series(&values, period).last().copied().flatten()
}
