//! Simple and exponential moving averages

use crate::candles::Candle;
use crate::indicators::{closed_series, IndicatorSample};

/// Rolling mean; `values.len() - period + 1` points, or none when `values.len() < period`
pub fn sma_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|window| window.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential mean with multiplier `2 / (period + 1)`, seeded by the simple mean of the
/// first `period` values
///
/// Point `i` of the output belongs to input index `period - 1 + i`.
pub fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * k + ema;
        out.push(ema);
    }
    out
}

/// SMA of closes, one sample per closed candle from index `period - 1`
pub fn sma(candles: &[Candle], period: usize) -> Vec<IndicatorSample> {
    let (timestamps, closes) = closed_series(candles);
    align(&timestamps, sma_values(&closes, period), period)
}

/// EMA of closes, one sample per closed candle from index `period - 1`
pub fn ema(candles: &[Candle], period: usize) -> Vec<IndicatorSample> {
    let (timestamps, closes) = closed_series(candles);
    align(&timestamps, ema_values(&closes, period), period)
}

fn align(timestamps: &[i64], values: Vec<f64>, period: usize) -> Vec<IndicatorSample> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| IndicatorSample {
            timestamp: timestamps[period - 1 + i],
            value,
        })
        .collect()
}
