//! Technical indicators over closed-candle series
//!
//! Every function here reads only the closed candles of its input, in order, and returns
//! samples aligned to closed-candle timestamps. Too little data yields an empty series,
//! never an error.

pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod pipeline;
pub mod rsi;

pub use bollinger::{bollinger, BollingerSample};
pub use macd::{crossover, crossovers, macd, MacdCrossover, MacdSample};
pub use moving_average::{ema, sma};
pub use pipeline::{IndicatorUpdate, KlinePipeline};
pub use rsi::{rsi, RsiSample};

use crate::candles::Candle;
use serde::{Deserialize, Serialize};

/// Single-valued indicator point (SMA, EMA)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSample {
    pub timestamp: i64,
    pub value: f64,
}

/// Timestamps and closes of the closed candles, oldest first
pub(crate) fn closed_series(candles: &[Candle]) -> (Vec<i64>, Vec<f64>) {
    candles
        .iter()
        .filter(|c| c.closed)
        .map(|c| (c.timestamp, c.close))
        .unzip()
}

/// Indicator periods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    /// Band width in standard deviations
    pub bollinger_k: f64,
    pub sma_period: usize,
    pub ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_k: 2.0,
            sma_period: 20,
            ema_period: 20,
        }
    }
}

/// Latest value of each indicator; `None` where the series is still too short
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Timestamp of the newest closed candle
    pub timestamp: Option<i64>,
    pub rsi: Option<RsiSample>,
    pub macd: Option<MacdSample>,
    pub macd_crossover: Option<MacdCrossover>,
    pub bollinger: Option<BollingerSample>,
    pub sma: Option<IndicatorSample>,
    pub ema: Option<IndicatorSample>,
}

/// Indicator calculator bound to one parameter set
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    pub fn rsi(&self, candles: &[Candle]) -> Vec<RsiSample> {
        rsi(candles, self.params.rsi_period)
    }

    pub fn macd(&self, candles: &[Candle]) -> Vec<MacdSample> {
        macd(
            candles,
            self.params.macd_fast,
            self.params.macd_slow,
            self.params.macd_signal,
        )
    }

    pub fn bollinger(&self, candles: &[Candle]) -> Vec<BollingerSample> {
        bollinger(candles, self.params.bollinger_period, self.params.bollinger_k)
    }

    pub fn sma(&self, candles: &[Candle]) -> Vec<IndicatorSample> {
        sma(candles, self.params.sma_period)
    }

    pub fn ema(&self, candles: &[Candle]) -> Vec<IndicatorSample> {
        ema(candles, self.params.ema_period)
    }

    pub fn snapshot(&self, candles: &[Candle]) -> IndicatorSnapshot {
        let macd = self.macd(candles);
        IndicatorSnapshot {
            timestamp: candles.iter().rev().find(|c| c.closed).map(|c| c.timestamp),
            rsi: self.rsi(candles).last().copied(),
            macd: macd.last().copied(),
            macd_crossover: crossover(&macd),
            bollinger: self.bollinger(candles).last().copied(),
            sma: self.sma(candles).last().copied(),
            ema: self.ema(candles).last().copied(),
        }
    }
}
