//! Candle data structures

use crate::stream::events::KlineEvent;
use serde::{Deserialize, Serialize};

/// One OHLCV candle
///
/// Provisional (`closed == false`) candles are replaced by every intra-interval update;
/// once closed a candle is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Interval start (milliseconds since Unix epoch)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub closed: bool,
}

impl Candle {
    pub fn from_kline(event: &KlineEvent) -> Self {
        Self {
            timestamp: event.interval_start,
            open: event.open,
            high: event.high,
            low: event.low,
            close: event.close,
            volume: event.volume,
            closed: event.is_closed,
        }
    }

    /// OHLCV invariants: finite values, `low <= min(open, close)`, `high >= max(open, close)`,
    /// non-negative volume
    pub fn is_valid(&self) -> bool {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        values.iter().all(|v| v.is_finite())
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
            && self.volume >= 0.0
    }
}

/// Hole in a closed-candle series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Interval start that should have closed next
    pub expected_start: i64,
    /// Interval start that actually closed
    pub actual_start: i64,
    /// Whole intervals missing between the two
    pub missing_intervals: i64,
}
