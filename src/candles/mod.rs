//! Candle aggregation
//!
//! Folds kline events into ordered, gap-checked OHLCV series, distinguishing the
//! provisional candle of the current interval from closed (immutable) candles.

pub mod aggregator;
pub mod types;

pub use aggregator::{CandleAggregator, CandleSeries, KlineOutcome, DEFAULT_HISTORY_LIMIT};
pub use types::{Candle, Gap};
