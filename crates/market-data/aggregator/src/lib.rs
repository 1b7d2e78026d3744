//! Per-symbol metrics aggregation
//!
//! One [`MetricsAggregator`] per currency pair owns every calculator and
//! the anomaly ensemble for that pair, applies events in strictly
//! increasing timestamp order and emits one internally consistent
//! [`MetricsSnapshot`] per processed event.
//! [`MultiSymbolMetricsManager`] routes transport events to lazily created
//! per-symbol units that share no state.

pub mod config;

pub use config::MetricsConfig;

use common::{
    MarketDataError, MarketEvent, MetricsSnapshot, OrderBook, Side, Symbol, Tick, Trade, Ts,
};
use microstructure::{
    AmihudIlliquidity, DepthAnalyzer, FlowImbalanceCalculator, KyleLambda, LeeReadyClassifier,
    SpreadCalculator, VolatilityAnalyzer, VolatilityRegime,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use surveillance::{FeatureVector, MultiFeatureAnomalyDetector};
use tracing::{debug, info};

/// Spread multiple used by the market-stress widening check
const STRESS_SPREAD_MULTIPLIER: f64 = 2.0;

/// Depth fraction under which the stress check reports depletion
const STRESS_DEPTH_RATIO: f64 = 0.25;

/// Short/long volatility ratio for the stress clustering check
const STRESS_CLUSTERING_THRESHOLD: f64 = 1.5;

/// Rolling flow imbalance beyond which flow counts as aggressive
const STRESS_FLOW_THRESHOLD: f64 = 0.3;

/// Processing counters for one symbol's unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Events accepted and applied
    pub events_processed: u64,
    /// Events rejected for violating timestamp ordering
    pub dropped_out_of_order: u64,
    /// Events rejected for belonging to another symbol
    pub dropped_misrouted: u64,
}

/// Market stress indicators derived from the calculators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStressReport {
    /// Newest spread far above the rolling mean
    pub spread_widening: bool,
    /// Book depth well below its rolling mean
    pub depth_depletion: bool,
    /// Short-horizon volatility elevated over the full window
    pub volatility_clustering: bool,
    /// Volatility regime classified high
    pub high_volatility_regime: bool,
    /// Strong buy-side order flow
    pub aggressive_buying: bool,
    /// Strong sell-side order flow
    pub aggressive_selling: bool,
}

/// Single entry point for one currency pair's event stream
#[derive(Debug)]
pub struct MetricsAggregator {
    symbol: Symbol,
    config: MetricsConfig,
    spread: SpreadCalculator,
    depth: DepthAnalyzer,
    volatility: VolatilityAnalyzer,
    classifier: LeeReadyClassifier,
    flow: FlowImbalanceCalculator,
    kyle: KyleLambda,
    amihud: AmihudIlliquidity,
    ensemble: MultiFeatureAnomalyDetector,
    last_quote: Option<Tick>,
    last_trade_price: Option<f64>,
    last_event_ts: Option<Ts>,
    last_snapshot: Option<MetricsSnapshot>,
    stats: AggregatorStats,
}

impl MetricsAggregator {
    /// Create the processing unit for `symbol`
    #[must_use]
    pub fn new(symbol: Symbol, config: MetricsConfig) -> Self {
        let ensemble = MultiFeatureAnomalyDetector::new(&config.ensemble_params());
        info!(%symbol, "metrics aggregator initialized");
        Self {
            symbol,
            spread: SpreadCalculator::new(config.spread_window),
            depth: DepthAnalyzer::new(config.depth_max_levels),
            volatility: VolatilityAnalyzer::new(config.volatility_window),
            classifier: LeeReadyClassifier::new(),
            flow: FlowImbalanceCalculator::new(config.flow_bucket_volume, config.flow_max_buckets),
            kyle: KyleLambda::new(config.kyle_window, config.kyle_min_observations),
            amihud: AmihudIlliquidity::new(config.amihud_window),
            ensemble,
            last_quote: None,
            last_trade_price: None,
            last_event_ts: None,
            last_snapshot: None,
            stats: AggregatorStats::default(),
            config,
        }
    }

    /// Symbol this unit owns
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Apply a quote update and emit a fresh snapshot
    ///
    /// # Errors
    /// `OutOfOrderEvent` when the tick does not advance the event clock;
    /// `MalformedEvent` when it belongs to another symbol. Rejected events
    /// mutate no state.
    pub fn process_tick(&mut self, tick: &Tick) -> Result<MetricsSnapshot, MarketDataError> {
        self.admit(tick.symbol(), tick.ts())?;

        self.spread.add_tick(tick);
        self.volatility.add_tick(tick);
        self.amihud.add_observation(
            tick.mid_price(),
            tick.bid_size().as_f64() + tick.ask_size().as_f64(),
        );
        self.ensemble.on_tick(tick);
        self.last_quote = Some(*tick);

        Ok(self.finalize(tick.ts()))
    }

    /// Apply a book snapshot and emit a fresh snapshot
    ///
    /// # Errors
    /// Same contract as [`Self::process_tick`].
    pub fn process_orderbook(
        &mut self,
        orderbook: &OrderBook,
    ) -> Result<MetricsSnapshot, MarketDataError> {
        self.admit(orderbook.symbol(), orderbook.ts())?;

        self.depth.add_orderbook(orderbook);
        self.ensemble.on_orderbook(orderbook);

        Ok(self.finalize(orderbook.ts()))
    }

    /// Classify and apply a trade, then emit a fresh snapshot
    ///
    /// An unknown side is filled in by the Lee-Ready classifier against the
    /// last accepted quote; trades that stay unclassified still advance the
    /// event clock but contribute no signed flow.
    ///
    /// # Errors
    /// Same contract as [`Self::process_tick`].
    pub fn process_trade(&mut self, trade: &Trade) -> Result<MetricsSnapshot, MarketDataError> {
        self.admit(trade.symbol(), trade.ts())?;

        let mut trade = *trade;
        if trade.side.is_none() {
            if let Some(quote) = self.last_quote {
                trade.side = self.classifier.classify(&trade, &quote);
            }
        }

        let price = trade.price().as_f64();
        if let Some(side) = trade.side {
            let size = trade.size().as_f64();
            self.flow.add_classified_trade(size, side);
            if let Some(prev) = self.last_trade_price {
                let signed = match side {
                    Side::Buy => size,
                    Side::Sell => -size,
                };
                self.kyle.add_observation(price - prev, signed);
            }
        }
        self.last_trade_price = Some(price);
        self.ensemble.on_trade(&trade);

        Ok(self.finalize(trade.ts()))
    }

    /// Latest snapshot without requiring a new event
    #[must_use]
    pub fn current_metrics(&self) -> Option<MetricsSnapshot> {
        self.last_snapshot.clone()
    }

    /// Processing counters
    #[must_use]
    pub const fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Kyle's Lambda over the rolling trade window
    #[must_use]
    pub fn kyles_lambda(&self) -> Option<f64> {
        self.kyle.lambda()
    }

    /// Amihud illiquidity over the rolling tick window
    #[must_use]
    pub fn amihud_illiquidity(&self) -> Option<f64> {
        self.amihud.illiquidity()
    }

    /// EWMA volatility with the configured decay
    #[must_use]
    pub fn ewma_volatility(&self) -> Option<f64> {
        self.volatility.ewma_volatility(self.config.ewma_lambda)
    }

    /// Composite liquidity score over the configured depth
    #[must_use]
    pub fn liquidity_score(&self) -> Option<f64> {
        self.depth.liquidity_score(self.config.depth_max_levels)
    }

    /// Stress indicators from the current calculator state
    #[must_use]
    pub fn detect_market_stress(&self) -> MarketStressReport {
        let flow_imbalance = self.flow.rolling_imbalance().unwrap_or(0.0);
        MarketStressReport {
            spread_widening: self.spread.detect_spread_widening(STRESS_SPREAD_MULTIPLIER),
            depth_depletion: self.depth.detect_depth_depletion(STRESS_DEPTH_RATIO),
            volatility_clustering: self
                .volatility
                .detect_volatility_clustering(STRESS_CLUSTERING_THRESHOLD),
            high_volatility_regime: self.volatility.volatility_regime()
                == Some(VolatilityRegime::High),
            aggressive_buying: flow_imbalance > STRESS_FLOW_THRESHOLD,
            aggressive_selling: flow_imbalance < -STRESS_FLOW_THRESHOLD,
        }
    }

    /// Overall market quality in [0, 100]; absent before the first tick
    #[must_use]
    pub fn market_quality_score(&self) -> Option<f64> {
        self.spread.current_spread()?;
        let stress = self.detect_market_stress();
        let mut score: f64 = 100.0;
        if stress.spread_widening {
            score -= 20.0;
        }
        if stress.depth_depletion {
            score -= 20.0;
        }
        if stress.high_volatility_regime {
            score -= 15.0;
        } else if self.volatility.volatility_regime() == Some(VolatilityRegime::Low) {
            score += 5.0;
        }
        if stress.volatility_clustering {
            score -= 10.0;
        }
        if let Some(liquidity) = self.liquidity_score() {
            if liquidity > 0.8 {
                score += 10.0;
            }
        }
        Some(score.clamp(0.0, 100.0))
    }

    /// Ordering and routing guard; rejected events mutate nothing
    fn admit(&mut self, symbol: Symbol, ts: Ts) -> Result<(), MarketDataError> {
        if symbol != self.symbol {
            self.stats.dropped_misrouted += 1;
            return Err(MarketDataError::MalformedEvent(format!(
                "event for {symbol} routed to {} unit",
                self.symbol
            )));
        }
        if let Some(last) = self.last_event_ts {
            if ts <= last {
                self.stats.dropped_out_of_order += 1;
                debug!(%symbol, %ts, %last, "out-of-order event dropped");
                return Err(MarketDataError::OutOfOrderEvent {
                    symbol,
                    event_ts: ts,
                    last_ts: last,
                });
            }
        }
        Ok(())
    }

    /// Build the snapshot for this event and score it through the ensemble
    ///
    /// Runs after every calculator update for the event, so the snapshot is
    /// one consistent view of the unit's state at the event timestamp.
    fn finalize(&mut self, ts: Ts) -> MetricsSnapshot {
        let (bid_ask_spread, spread_bps, mid_price) = self.quote_view();
        let (bid_depth, ask_depth, total_depth) = self
            .depth
            .current_depth()
            .map_or((0.0, 0.0, 0.0), |d| (d.bid_depth, d.ask_depth, d.total_depth));
        let order_flow_imbalance = self.flow.rolling_imbalance().unwrap_or(0.0);
        let volatility = self.volatility.realized_volatility(false);

        let features = FeatureVector {
            mid_price,
            spread: bid_ask_spread,
            spread_bps,
            bid_depth,
            ask_depth,
            total_depth,
            flow_imbalance: order_flow_imbalance,
            volatility: volatility.unwrap_or(0.0),
        };
        let decision = self.ensemble.evaluate(&features);

        let snapshot = MetricsSnapshot {
            ts,
            symbol: self.symbol,
            bid_ask_spread,
            spread_bps,
            bid_depth,
            ask_depth,
            total_depth,
            order_flow_imbalance,
            volatility,
            is_anomaly: decision.is_anomaly,
            anomaly_type: decision.anomaly_type,
            anomaly_score: decision.anomaly_score,
        };

        self.last_event_ts = Some(ts);
        self.stats.events_processed += 1;
        self.last_snapshot = Some(snapshot.clone());
        debug!(symbol = %self.symbol, %ts, "snapshot produced");
        snapshot
    }

    /// Spread fields for the snapshot, falling back to the book top before
    /// any tick has arrived
    fn quote_view(&self) -> (f64, f64, f64) {
        if let (Some(spread), Some(spread_bps), Some(quote)) = (
            self.spread.current_spread(),
            self.spread.current_spread_bps(),
            self.last_quote.as_ref(),
        ) {
            return (spread, spread_bps, quote.mid_price());
        }
        if let Some(book) = self.depth.current_book() {
            if let (Some(bid), Some(ask)) = (book.bids().first(), book.asks().first()) {
                let bid = bid.price.as_f64();
                let ask = ask.price.as_f64();
                let mid = (bid + ask) / 2.0;
                let spread = ask - bid;
                let spread_bps = if mid > 0.0 { spread / mid * 10_000.0 } else { 0.0 };
                return (spread, spread_bps, mid);
            }
        }
        (0.0, 0.0, 0.0)
    }
}

/// Routes transport events to independent per-symbol units
///
/// Units are created lazily on a symbol's first event and share no mutable
/// state; one symbol's error never halts another's processing.
#[derive(Debug)]
pub struct MultiSymbolMetricsManager {
    config: MetricsConfig,
    aggregators: FxHashMap<Symbol, MetricsAggregator>,
}

impl MultiSymbolMetricsManager {
    /// Create a manager cloning `config` into each new unit
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            aggregators: FxHashMap::default(),
        }
    }

    /// Route one event to its symbol's unit, creating the unit on first use
    ///
    /// # Errors
    /// Propagates the unit's rejection for this event; other symbols are
    /// unaffected.
    pub fn process(&mut self, event: &MarketEvent) -> Result<MetricsSnapshot, MarketDataError> {
        let symbol = event.symbol();
        let aggregator = self
            .aggregators
            .entry(symbol)
            .or_insert_with(|| MetricsAggregator::new(symbol, self.config.clone()));
        match event {
            MarketEvent::Tick(tick) => aggregator.process_tick(tick),
            MarketEvent::OrderBook(book) => aggregator.process_orderbook(book),
            MarketEvent::Trade(trade) => aggregator.process_trade(trade),
        }
    }

    /// Latest snapshot for `symbol`, when its unit exists and has produced one
    #[must_use]
    pub fn current_metrics(&self, symbol: Symbol) -> Option<MetricsSnapshot> {
        self.aggregators.get(&symbol)?.current_metrics()
    }

    /// Borrow a symbol's unit for detailed metrics
    #[must_use]
    pub fn aggregator(&self, symbol: Symbol) -> Option<&MetricsAggregator> {
        self.aggregators.get(&symbol)
    }

    /// Tear down a symbol's unit between events; true when one existed
    pub fn remove_symbol(&mut self, symbol: Symbol) -> bool {
        let removed = self.aggregators.remove(&symbol).is_some();
        if removed {
            info!(%symbol, "metrics aggregator removed");
        }
        removed
    }

    /// Symbols with live units
    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.aggregators.keys().copied()
    }

    /// Number of live units
    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    /// True when no unit exists yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregator_snapshot_fields() {
        let mut agg = MetricsAggregator::new(Symbol::new(1), MetricsConfig::default());
        let tick = Tick::new(Ts::from_secs(1), Symbol::new(1), 1.0850, 1.0852, 100.0, 120.0)
            .expect("valid tick");
        let snapshot = agg.process_tick(&tick).expect("accepted");
        assert_eq!(snapshot.symbol, Symbol::new(1));
        assert!((snapshot.bid_ask_spread - 0.0002).abs() < 1e-9);
        assert!(snapshot.volatility.is_none());
        assert_eq!(agg.current_metrics(), Some(snapshot));
    }

    #[test]
    fn test_misrouted_event_rejected() {
        let mut agg = MetricsAggregator::new(Symbol::new(1), MetricsConfig::default());
        let tick = Tick::new(Ts::from_secs(1), Symbol::new(2), 1.0850, 1.0852, 100.0, 120.0)
            .expect("valid tick");
        assert!(agg.process_tick(&tick).is_err());
        assert_eq!(agg.stats().dropped_misrouted, 1);
        assert!(agg.current_metrics().is_none());
    }
}
