use crate::candles::Candle;
use crate::indicators::closed_series;
use crate::indicators::moving_average::ema_values;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdSample {
    pub timestamp: i64,
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Sign change of the MACD histogram between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacdCrossover {
    Bullish,
    Bearish,
}

impl MacdCrossover {
    fn between(prev: &MacdSample, cur: &MacdSample) -> Option<Self> {
        if prev.histogram <= 0.0 && cur.histogram > 0.0 {
            Some(Self::Bullish)
        } else if prev.histogram >= 0.0 && cur.histogram < 0.0 {
            Some(Self::Bearish)
        } else {
            None
        }
    }
}

/// MACD line, signal line and histogram
///
/// Empty unless there are at least `slow + signal` closed candles. The MACD line starts at
/// candle index `slow - 1`, so the fast EMA is read `slow - fast` points in; the first
/// signal value lands on candle index `slow + signal - 2`.
pub fn macd(candles: &[Candle], fast: usize, slow: usize, signal: usize) -> Vec<MacdSample> {
    let (timestamps, closes) = closed_series(candles);
    if fast == 0 || signal == 0 || fast >= slow || closes.len() < slow + signal {
        return Vec::new();
    }

    let fast_ema = ema_values(&closes, fast);
    let slow_ema = ema_values(&closes, slow);
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, slow_value)| fast_ema[i + offset] - slow_value)
        .collect();

    let signal_line = ema_values(&line, signal);
    let first = slow + signal - 2;
    signal_line
        .iter()
        .enumerate()
        .map(|(i, &signal_value)| {
            let macd = line[signal - 1 + i];
            MacdSample {
                timestamp: timestamps[first + i],
                macd,
                signal: signal_value,
                histogram: macd - signal_value,
            }
        })
        .collect()
}

/// Crossover between the last two samples, if any
pub fn crossover(samples: &[MacdSample]) -> Option<MacdCrossover> {
    match samples {
        [.., prev, cur] => MacdCrossover::between(prev, cur),
        _ => None,
    }
}

/// Every crossover in the series with the timestamp of the sample it completes on
pub fn crossovers(samples: &[MacdSample]) -> Vec<(i64, MacdCrossover)> {
    samples
        .windows(2)
        .filter_map(|w| MacdCrossover::between(&w[0], &w[1]).map(|c| (w[1].timestamp, c)))
        .collect()
}
