/// Fractal divergences between an oscillator and price
///
/// A fractal top is confirmed two bars after the peak: the value at `i-2`
/// is above both of its two predecessors and both of its two successors.
/// Bottoms mirror that. Only fractals beyond the level count (tops at or
/// above `ob_level`, bottoms at or below `os_level`).
///
/// A bearish divergence is a qualifying top where price closed higher than
/// at the previous qualifying top while the oscillator peaked lower.
/// Bullish mirrors it on bottoms. Flags are set on the confirming bar `i`.

use super::{gt, lt};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Divergences {
    pub bearish: Vec<bool>,
    pub bullish: Vec<bool>,
}

/// Oscillator value and price at a confirmed fractal
#[derive(Debug, Clone, Copy)]
struct Pivot {
    value: f64,
    price: f64,
}

pub fn find_divergences(
    series: &[Option<f64>],
    price: &[f64],
    ob_level: f64,
    os_level: f64,
) -> Divergences {
    let len = series.len().min(price.len());
    let mut result = Divergences {
        bearish: vec![false; len],
        bullish: vec![false; len],
    };

    let mut last_top: Option<Pivot> = None;
    let mut last_bottom: Option<Pivot> = None;

    for i in 4..len {
        let Some(value) = series[i - 2] else { continue };
        let pivot = Some(value);
        let (s0, s1, s3, s4) = (series[i], series[i - 1], series[i - 3], series[i - 4]);
        let current = Pivot {
            value,
            price: price[i - 2],
        };

        let fractal_top = lt(s4, pivot) && lt(s3, pivot) && gt(pivot, s1) && gt(pivot, s0);
        if fractal_top && value >= ob_level {
            if let Some(prev) = last_top {
                result.bearish[i] = current.price > prev.price && current.value < prev.value;
            }
            last_top = Some(current);
        }

        let fractal_bot = gt(s4, pivot) && gt(s3, pivot) && lt(pivot, s1) && lt(pivot, s0);
        if fractal_bot && value <= os_level {
            if let Some(prev) = last_bottom {
                result.bullish[i] = current.price < prev.price && current.value > prev.value;
            }
            last_bottom = Some(current);
        }
    }

    result
}
