use crate::candles::Candle;
use crate::indicators::closed_series;
use serde::{Deserialize, Serialize};

pub const OVERBOUGHT: f64 = 70.0;
pub const OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiSample {
    pub timestamp: i64,
    pub value: f64,
    pub overbought: bool,
    pub oversold: bool,
}

impl RsiSample {
    fn new(timestamp: i64, avg_gain: f64, avg_loss: f64) -> Self {
        let value = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        Self {
            timestamp,
            value,
            overbought: value > OVERBOUGHT,
            oversold: value < OVERSOLD,
        }
    }
}

/// RSI (Relative Strength Index) with Wilder smoothing
///
/// The first average gain/loss is the simple mean of the first `period` deltas; later
/// values use `avg = (avg * (period - 1) + x) / period`. Needs `period + 1` closed candles,
/// the first sample lands on candle index `period`.
pub fn rsi(candles: &[Candle], period: usize) -> Vec<RsiSample> {
    let (timestamps, closes) = closed_series(candles);
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |delta: f64| delta.max(0.0);
    let loss = |delta: f64| (-delta).max(0.0);

    let p = period as f64;
    let mut avg_gain = deltas[..period].iter().map(|&d| gain(d)).sum::<f64>() / p;
    let mut avg_loss = deltas[..period].iter().map(|&d| loss(d)).sum::<f64>() / p;

    let mut out = Vec::with_capacity(closes.len() - period);
    out.push(RsiSample::new(timestamps[period], avg_gain, avg_loss));
    for (i, &delta) in deltas.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (p - 1.0) + gain(delta)) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss(delta)) / p;
        // delta i spans closes i..=i+1
        out.push(RsiSample::new(timestamps[i + 1], avg_gain, avg_loss));
    }
    out
}
