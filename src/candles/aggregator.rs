//! Kline aggregation into ordered candle series
//!
//! One [`CandleSeries`] per `(symbol, interval)`. Intra-interval updates overwrite the
//! provisional candle; a closing update appends to the closed series exactly once.
//! Gaps between closed candles are recorded but never block the series.

use crate::candles::types::{Candle, Gap};
use crate::stream::channel::KlineInterval;
use crate::stream::events::KlineEvent;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Default number of closed candles retained per series
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Result of folding one kline into a series
#[derive(Debug, Clone, PartialEq)]
pub enum KlineOutcome {
    /// Provisional candle replaced
    Provisional,
    /// Candle closed and appended
    Closed(Candle),
    /// Repeat of the last closed interval, ignored
    Duplicate,
    /// Older than the last closed interval, ignored
    Stale,
    /// Failed OHLCV validation, ignored
    Rejected,
}

/// Closed candles for one symbol and interval, strictly increasing in timestamp
#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: String,
    interval: KlineInterval,
    provisional: Option<Candle>,
    closed: Vec<Candle>,
    gaps: Vec<Gap>,
    history_limit: usize,
    last_closed_start: Option<i64>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, interval: KlineInterval, history_limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            provisional: None,
            closed: Vec::new(),
            gaps: Vec::new(),
            history_limit: history_limit.max(1),
            last_closed_start: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> KlineInterval {
        self.interval
    }

    /// In-progress candle of the current interval
    pub fn provisional(&self) -> Option<&Candle> {
        self.provisional.as_ref()
    }

    /// Closed candles, oldest first
    pub fn closed(&self) -> &[Candle] {
        &self.closed
    }

    /// Recorded gaps, oldest first, capped at the history limit
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    pub fn apply(&mut self, event: &KlineEvent) -> KlineOutcome {
        let candle = Candle::from_kline(event);
        if !candle.is_valid() {
            warn!(
                symbol = %self.symbol,
                interval = %self.interval,
                interval_start = candle.timestamp,
                "Rejecting kline violating OHLCV invariants"
            );
            return KlineOutcome::Rejected;
        }

        if let Some(last) = self.last_closed_start {
            if candle.timestamp == last {
                debug!(
                    symbol = %self.symbol,
                    interval_start = candle.timestamp,
                    "Ignoring kline for already closed interval"
                );
                return KlineOutcome::Duplicate;
            }
            if candle.timestamp < last {
                debug!(
                    symbol = %self.symbol,
                    interval_start = candle.timestamp,
                    last_closed = last,
                    "Ignoring stale kline"
                );
                return KlineOutcome::Stale;
            }
        }

        if !candle.closed {
            self.provisional = Some(candle);
            return KlineOutcome::Provisional;
        }

        if let Some(last) = self.last_closed_start {
            let step = self.interval.as_millis();
            let expected = last + step;
            if candle.timestamp != expected {
                let gap = Gap {
                    expected_start: expected,
                    actual_start: candle.timestamp,
                    missing_intervals: (candle.timestamp - expected) / step,
                };
                warn!(
                    symbol = %self.symbol,
                    interval = %self.interval,
                    expected_start = gap.expected_start,
                    actual_start = gap.actual_start,
                    missing = gap.missing_intervals,
                    "Gap in closed candle series"
                );
                self.gaps.push(gap);
                if self.gaps.len() > self.history_limit {
                    let excess = self.gaps.len() - self.history_limit;
                    self.gaps.drain(..excess);
                }
            }
        }

        if self
            .provisional
            .is_some_and(|p| p.timestamp <= candle.timestamp)
        {
            self.provisional = None;
        }
        self.closed.push(candle);
        self.last_closed_start = Some(candle.timestamp);
        if self.closed.len() > self.history_limit {
            let excess = self.closed.len() - self.history_limit;
            self.closed.drain(..excess);
        }

        KlineOutcome::Closed(candle)
    }
}

/// Candle series for every `(symbol, interval)` seen
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    series: HashMap<(String, KlineInterval), CandleSeries>,
    history_limit: usize,
}

impl CandleAggregator {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            series: HashMap::new(),
            history_limit,
        }
    }

    /// Fold one kline into its series, creating the series on first sight
    pub fn apply(&mut self, event: &KlineEvent) -> KlineOutcome {
        let history_limit = self.history_limit;
        self.series
            .entry((event.symbol.to_uppercase(), event.interval))
            .or_insert_with(|| CandleSeries::new(event.symbol.to_uppercase(), event.interval, history_limit))
            .apply(event)
    }

    pub fn series(&self, symbol: &str, interval: KlineInterval) -> Option<&CandleSeries> {
        self.series.get(&(symbol.to_uppercase(), interval))
    }

    /// Closed candles for `symbol`, empty when none have closed
    pub fn closed(&self, symbol: &str, interval: KlineInterval) -> &[Candle] {
        self.series(symbol, interval)
            .map(CandleSeries::closed)
            .unwrap_or(&[])
    }
}

impl Default for CandleAggregator {
    fn default() -> Self {
        Self::new()
    }
}
