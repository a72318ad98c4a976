//! Kline stream to indicator updates
//!
//! Folds kline events into a [`CandleAggregator`] and recomputes an [`IndicatorSnapshot`]
//! each time a candle closes.

use crate::candles::{Candle, CandleAggregator, KlineOutcome};
use crate::error::Result;
use crate::indicators::{IndicatorEngine, IndicatorSnapshot};
use crate::stream::channel::{ChannelKey, ChannelKind, KlineInterval};
use crate::stream::events::{KlineEvent, MarketEvent};
use crate::stream::manager::{StreamConnectionManager, SubscriptionHandle};
use crate::stream::transport::Connector;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Indicator values after a candle closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorUpdate {
    pub symbol: String,
    pub interval: KlineInterval,
    /// The candle that just closed
    pub candle: Candle,
    pub snapshot: IndicatorSnapshot,
}

pub struct KlinePipeline<F> {
    aggregator: CandleAggregator,
    engine: IndicatorEngine,
    on_update: F,
}

impl<F> KlinePipeline<F>
where
    F: FnMut(IndicatorUpdate),
{
    pub fn new(engine: IndicatorEngine, history_limit: usize, on_update: F) -> Self {
        Self {
            aggregator: CandleAggregator::with_history_limit(history_limit),
            engine,
            on_update,
        }
    }

    /// Feed any market event; non-kline events are ignored
    pub fn handle(&mut self, event: &MarketEvent) -> Option<KlineOutcome> {
        match event {
            MarketEvent::Kline(kline) => Some(self.handle_kline(kline)),
            _ => None,
        }
    }

    pub fn handle_kline(&mut self, kline: &KlineEvent) -> KlineOutcome {
        let outcome = self.aggregator.apply(kline);
        if let KlineOutcome::Closed(candle) = &outcome {
            let closed = self.aggregator.closed(&kline.symbol, kline.interval);
            let snapshot = self.engine.snapshot(closed);
            debug!(
                symbol = %kline.symbol,
                interval = %kline.interval,
                candles = closed.len(),
                "Candle closed, indicators updated"
            );
            (self.on_update)(IndicatorUpdate {
                symbol: kline.symbol.to_uppercase(),
                interval: kline.interval,
                candle: *candle,
                snapshot,
            });
        }
        outcome
    }

    pub fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }
}

impl<C: Connector> StreamConnectionManager<C> {
    /// Subscribe to `symbol`'s klines and receive an [`IndicatorUpdate`] per closed candle
    pub fn subscribe_indicators<F>(
        &self,
        symbol: &str,
        interval: KlineInterval,
        engine: IndicatorEngine,
        history_limit: usize,
        on_update: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(IndicatorUpdate) + Send + 'static,
    {
        let key = ChannelKey::new(symbol, ChannelKind::Kline(interval))?;
        let pipeline = Mutex::new(KlinePipeline::new(engine, history_limit, on_update));
        Ok(self.subscribe(key, move |event| {
            pipeline.lock().handle(event);
        }))
    }
}
