//! Unit tests for the per-symbol aggregator

use common::{MarketDataError, OrderBook, OrderBookLevel, Side, Symbol, Tick, Trade, Ts};
use metrics_aggregator::{MetricsAggregator, MetricsConfig};
use pretty_assertions::assert_eq;
use rstest::*;

const EPS: f64 = 1e-9;

#[fixture]
fn symbol() -> Symbol {
    Symbol::new(1)
}

#[fixture]
fn aggregator(symbol: Symbol) -> MetricsAggregator {
    MetricsAggregator::new(symbol, MetricsConfig::default())
}

fn tick_at(symbol: Symbol, ts_ms: u64, bid: f64, ask: f64) -> Tick {
    Tick::new(
        Ts::from_nanos(ts_ms * 1_000_000),
        symbol,
        bid,
        ask,
        100.0,
        120.0,
    )
    .expect("valid tick")
}

fn book_at(symbol: Symbol, ts_ms: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
    OrderBook::new(
        Ts::from_nanos(ts_ms * 1_000_000),
        symbol,
        bids.iter().map(|&(p, s)| OrderBookLevel::new(p, s, 1)).collect(),
        asks.iter().map(|&(p, s)| OrderBookLevel::new(p, s, 1)).collect(),
    )
    .expect("valid book")
}

fn trade_at(symbol: Symbol, ts_ms: u64, price: f64, size: f64, side: Option<Side>) -> Trade {
    Trade::new(
        Ts::from_nanos(ts_ms * 1_000_000),
        symbol,
        price,
        size,
        side,
        ts_ms,
    )
    .expect("valid trade")
}

#[rstest]
fn test_snapshot_spread_matches_tick(mut aggregator: MetricsAggregator, symbol: Symbol) {
    let snapshot = aggregator
        .process_tick(&tick_at(symbol, 1, 1.0850, 1.0852))
        .expect("accepted");
    assert!((snapshot.bid_ask_spread - 0.0002).abs() < EPS);
    let expected_bps = 0.0002 / 1.0851 * 10_000.0;
    assert!((snapshot.spread_bps - expected_bps).abs() < 1e-6);
}

#[rstest]
fn test_out_of_order_tick_rejected_and_state_unchanged(
    mut aggregator: MetricsAggregator,
    symbol: Symbol,
) {
    aggregator
        .process_tick(&tick_at(symbol, 100, 1.0850, 1.0852))
        .expect("accepted");
    aggregator
        .process_tick(&tick_at(symbol, 200, 1.0849, 1.0853))
        .expect("accepted");

    let before = aggregator.current_metrics().expect("snapshot exists");
    let before_stats = aggregator.stats();

    // Earlier timestamp: rejected without touching any calculator
    let result = aggregator.process_tick(&tick_at(symbol, 150, 1.0700, 1.0900));
    assert!(matches!(result, Err(MarketDataError::OutOfOrderEvent { .. })));
    assert_eq!(aggregator.current_metrics(), Some(before.clone()));
    assert_eq!(
        aggregator.stats().events_processed,
        before_stats.events_processed
    );
    assert_eq!(aggregator.stats().dropped_out_of_order, 1);

    // An equal timestamp is also a violation of strict ordering
    let result = aggregator.process_tick(&tick_at(symbol, 200, 1.0850, 1.0852));
    assert!(result.is_err());
    assert_eq!(aggregator.current_metrics(), Some(before));
    assert_eq!(aggregator.stats().dropped_out_of_order, 2);
}

#[rstest]
fn test_unit_recovers_after_rejection(mut aggregator: MetricsAggregator, symbol: Symbol) {
    aggregator
        .process_tick(&tick_at(symbol, 100, 1.0850, 1.0852))
        .expect("accepted");
    let _ = aggregator.process_tick(&tick_at(symbol, 50, 1.0850, 1.0852));
    // Subsequent valid events keep flowing
    let snapshot = aggregator
        .process_tick(&tick_at(symbol, 200, 1.0849, 1.0853))
        .expect("accepted after rejection");
    assert_eq!(snapshot.ts, Ts::from_nanos(200 * 1_000_000));
}

#[rstest]
fn test_orderbook_fills_depth_fields(mut aggregator: MetricsAggregator, symbol: Symbol) {
    let snapshot = aggregator
        .process_orderbook(&book_at(
            symbol,
            1,
            &[(1.0850, 300.0), (1.0849, 200.0)],
            &[(1.0852, 100.0), (1.0853, 150.0)],
        ))
        .expect("accepted");
    assert!((snapshot.bid_depth - 500.0).abs() < EPS);
    assert!((snapshot.ask_depth - 250.0).abs() < EPS);
    assert!((snapshot.total_depth - 750.0).abs() < EPS);
    // Before any tick the spread falls back to the book top
    assert!((snapshot.bid_ask_spread - 0.0002).abs() < EPS);
}

#[rstest]
fn test_snapshot_imbalance_in_bounds(mut aggregator: MetricsAggregator, symbol: Symbol) {
    aggregator
        .process_orderbook(&book_at(symbol, 1, &[(1.0850, 900.0)], &[(1.0852, 100.0)]))
        .expect("accepted");
    let snapshot = aggregator
        .process_tick(&tick_at(symbol, 2, 1.0850, 1.0852))
        .expect("accepted");
    assert!((-1.0..=1.0).contains(&snapshot.order_flow_imbalance));
}

#[rstest]
fn test_trade_classified_against_prevailing_quote(
    mut aggregator: MetricsAggregator,
    symbol: Symbol,
) {
    aggregator
        .process_tick(&tick_at(symbol, 1, 1.0850, 1.0852))
        .expect("accepted");
    // Above the midpoint: classified as a buy and counted as buy flow
    aggregator
        .process_trade(&trade_at(symbol, 2, 1.0852, 600.0, None))
        .expect("accepted");
    aggregator
        .process_trade(&trade_at(symbol, 3, 1.0852, 600.0, None))
        .expect("accepted");
    let snapshot = aggregator.current_metrics().expect("snapshot exists");
    // Two buy-only buckets of the default 1000-unit bucket volume closed
    assert!(snapshot.order_flow_imbalance > 0.99);
}

#[rstest]
fn test_volatility_warms_up(mut aggregator: MetricsAggregator, symbol: Symbol) {
    let snapshot = aggregator
        .process_tick(&tick_at(symbol, 1, 1.0850, 1.0852))
        .expect("accepted");
    assert!(snapshot.volatility.is_none());

    let mut last = None;
    for i in 2..10 {
        let wiggle = if i % 2 == 0 { 0.0002 } else { -0.0002 };
        last = Some(
            aggregator
                .process_tick(&tick_at(symbol, i, 1.0850 + wiggle, 1.0852 + wiggle))
                .expect("accepted"),
        );
    }
    assert!(last.expect("ticks processed").volatility.is_some());
}

#[rstest]
fn test_kyle_lambda_warms_up(mut aggregator: MetricsAggregator, symbol: Symbol) {
    aggregator
        .process_tick(&tick_at(symbol, 1, 1.0850, 1.0852))
        .expect("accepted");
    assert!(aggregator.kyles_lambda().is_none());

    // Alternating signed flow with proportional price moves
    let mut price = 1.0851;
    for i in 0..30u64 {
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        price += if i % 2 == 0 { 0.0002 } else { -0.0001 };
        aggregator
            .process_trade(&trade_at(symbol, 10 + i, price, 50.0 + i as f64, Some(side)))
            .expect("accepted");
    }
    assert!(aggregator.kyles_lambda().is_some());
}

#[rstest]
fn test_quality_score_requires_ticks(mut aggregator: MetricsAggregator, symbol: Symbol) {
    assert!(aggregator.market_quality_score().is_none());
    aggregator
        .process_tick(&tick_at(symbol, 1, 1.0850, 1.0852))
        .expect("accepted");
    let score = aggregator.market_quality_score().expect("tick seen");
    assert!((0.0..=100.0).contains(&score));
}

#[rstest]
fn test_stress_report_on_calm_market(mut aggregator: MetricsAggregator, symbol: Symbol) {
    for i in 0..30 {
        aggregator
            .process_tick(&tick_at(symbol, i + 1, 1.0850, 1.0852))
            .expect("accepted");
    }
    let stress = aggregator.detect_market_stress();
    assert!(!stress.spread_widening);
    assert!(!stress.depth_depletion);
    assert!(!stress.aggressive_buying);
    assert!(!stress.aggressive_selling);
}
