use crate::candles::Candle;
use crate::indicators::closed_series;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerSample {
    pub timestamp: i64,
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// `(upper - lower) / middle * 100`, zero when `middle == 0`
    pub bandwidth: f64,
    /// Position of the close inside the band, `None` when the band has no width
    pub percent_b: Option<f64>,
}

/// Bollinger Bands over a rolling window using the population standard deviation
///
/// Empty when `k` is not a positive finite width.
pub fn bollinger(candles: &[Candle], period: usize, k: f64) -> Vec<BollingerSample> {
    let (timestamps, closes) = closed_series(candles);
    if period == 0 || !(k.is_finite() && k > 0.0) || closes.len() < period {
        return Vec::new();
    }

    closes
        .windows(period)
        .enumerate()
        .map(|(i, window)| {
            let middle = window.iter().mean();
            let std_dev = window.iter().population_std_dev();
            let upper = middle + k * std_dev;
            let lower = middle - k * std_dev;
            let width = upper - lower;
            let close = window[period - 1];

            BollingerSample {
                timestamp: timestamps[period - 1 + i],
                upper,
                middle,
                lower,
                bandwidth: if middle == 0.0 { 0.0 } else { width / middle * 100.0 },
                percent_b: (width > 0.0).then(|| (close - lower) / width),
            }
        })
        .collect()
}
