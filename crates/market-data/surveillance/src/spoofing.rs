//! Spoofing detection: oversized resting orders canceled before execution

use common::{OrderBook, Side, Trade, Ts};
use std::collections::VecDeque;
use tracing::warn;

/// EMA weight for the trailing per-level size average
const AVG_ALPHA: f64 = 0.1;

/// Price tolerance when re-locating a tracked level
const PRICE_TOLERANCE: f64 = 1e-4;

/// A tracked order counts as canceled below this fraction of its size
const REDUCTION_TOLERANCE: f64 = 0.8;

/// Pending oversized orders expire unresolved after this long
const PENDING_WINDOW_NANOS: u64 = 10_000_000_000;

/// Bound on retained trade prints used for the consumption check
const MAX_TRADES: usize = 256;

#[derive(Debug, Clone, Copy)]
struct PendingOrder {
    detected_at: Ts,
    side: Side,
    price: f64,
    size: f64,
    ratio: f64,
}

/// Tracks resting sizes in the top levels of the book and fires when an
/// abnormally large order disappears before any trade consumes it
#[derive(Debug)]
pub struct SpoofingDetector {
    depth_threshold: usize,
    size_multiplier: f64,
    bid_avgs: Vec<Option<f64>>,
    ask_avgs: Vec<Option<f64>>,
    pending: VecDeque<PendingOrder>,
    recent_trades: VecDeque<(Ts, f64)>,
    event_score: f64,
    spoofing_events: u64,
}

impl SpoofingDetector {
    /// Create a detector monitoring the top `depth_threshold` levels and
    /// flagging sizes above `size_multiplier` times the trailing average
    #[must_use]
    pub fn new(depth_threshold: usize, size_multiplier: f64) -> Self {
        let depth = depth_threshold.max(1);
        Self {
            depth_threshold: depth,
            size_multiplier: size_multiplier.max(1.0),
            bid_avgs: vec![None; depth],
            ask_avgs: vec![None; depth],
            pending: VecDeque::new(),
            recent_trades: VecDeque::new(),
            event_score: 0.0,
            spoofing_events: 0,
        }
    }

    /// Record a trade print for the consumption check
    pub fn on_trade(&mut self, trade: &Trade) {
        if self.recent_trades.len() == MAX_TRADES {
            self.recent_trades.pop_front();
        }
        self.recent_trades
            .push_back((trade.ts(), trade.price().as_f64()));
    }

    /// Update tracking with a new book snapshot
    ///
    /// Resolves previously recorded oversized orders first (a vanished
    /// order with no matching trade confirms a spoof), then scans the new
    /// snapshot for fresh oversized levels and updates the trailing
    /// averages.
    pub fn on_orderbook(&mut self, book: &OrderBook) {
        self.resolve_pending(book);
        self.scan_side(book.ts(), Side::Buy, book.bids());
        self.scan_side(book.ts(), Side::Sell, book.asks());
    }

    fn resolve_pending(&mut self, book: &OrderBook) {
        let now = book.ts().as_nanos();
        let mut confirmed_ratio: Option<f64> = None;
        let recent_trades = &self.recent_trades;

        self.pending.retain(|order| {
            if Self::order_present(order, book) {
                // Still resting; keep until expiry
                return now.saturating_sub(order.detected_at.as_nanos()) < PENDING_WINDOW_NANOS;
            }
            let consumed = recent_trades.iter().any(|&(ts, price)| {
                ts >= order.detected_at && (price - order.price).abs() <= PRICE_TOLERANCE
            });
            if !consumed {
                let best = confirmed_ratio.get_or_insert(order.ratio);
                *best = best.max(order.ratio);
            }
            false
        });

        if let Some(ratio) = confirmed_ratio {
            self.event_score = (ratio / (2.0 * self.size_multiplier)).min(1.0);
            self.spoofing_events += 1;
            warn!(ratio, "spoofing pattern: oversized order canceled before execution");
        }
    }

    fn order_present(order: &PendingOrder, book: &OrderBook) -> bool {
        let levels = match order.side {
            Side::Buy => book.bids(),
            Side::Sell => book.asks(),
        };
        levels.iter().any(|l| {
            (l.price.as_f64() - order.price).abs() <= PRICE_TOLERANCE
                && l.size.as_f64() >= order.size * REDUCTION_TOLERANCE
        })
    }

    fn scan_side(&mut self, ts: Ts, side: Side, levels: &[common::OrderBookLevel]) {
        for (idx, level) in levels.iter().take(self.depth_threshold).enumerate() {
            let size = level.size.as_f64();
            let price = level.price.as_f64();
            let avgs = match side {
                Side::Buy => &mut self.bid_avgs,
                Side::Sell => &mut self.ask_avgs,
            };
            match avgs[idx] {
                Some(avg) => {
                    if avg > 0.0 && size > self.size_multiplier * avg {
                        let already_tracked = self.pending.iter().any(|p| {
                            p.side == side && (p.price - price).abs() <= PRICE_TOLERANCE
                        });
                        if !already_tracked {
                            self.pending.push_back(PendingOrder {
                                detected_at: ts,
                                side,
                                price,
                                size,
                                ratio: size / avg,
                            });
                        }
                    }
                    avgs[idx] = Some(avg + AVG_ALPHA * (size - avg));
                }
                None => avgs[idx] = Some(size),
            }
        }
    }

    /// Score for the current observation; confirmed spoofs are one-shot
    pub fn observe(&mut self) -> f64 {
        std::mem::take(&mut self.event_score)
    }

    /// True when the score is past the firing boundary
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > 0.5
    }

    /// Oversized orders currently awaiting resolution
    #[must_use]
    pub fn pending_orders(&self) -> usize {
        self.pending.len()
    }

    /// Confirmed spoofs so far
    #[must_use]
    pub const fn spoofing_events(&self) -> u64 {
        self.spoofing_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderBookLevel, Symbol};

    fn book(ts_ms: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
        OrderBook::new(
            Ts::from_nanos(ts_ms * 1_000_000),
            Symbol::new(1),
            bids.iter().map(|&(p, s)| OrderBookLevel::new(p, s, 1)).collect(),
            asks.iter().map(|&(p, s)| OrderBookLevel::new(p, s, 1)).collect(),
        )
        .expect("valid book")
    }

    fn steady_books(det: &mut SpoofingDetector, count: u64) {
        for i in 0..count {
            det.on_orderbook(&book(
                i * 100,
                &[(1.0850, 100.0), (1.0849, 100.0)],
                &[(1.0852, 100.0), (1.0853, 100.0)],
            ));
        }
    }

    #[test]
    fn test_steady_book_no_events() {
        let mut det = SpoofingDetector::new(5, 3.0);
        steady_books(&mut det, 20);
        assert_eq!(det.observe(), 0.0);
        assert_eq!(det.pending_orders(), 0);
    }

    #[test]
    fn test_oversized_order_tracked() {
        let mut det = SpoofingDetector::new(5, 3.0);
        steady_books(&mut det, 20);
        // 10x the trailing average appears at the second bid level
        det.on_orderbook(&book(
            2100,
            &[(1.0850, 100.0), (1.0849, 1000.0)],
            &[(1.0852, 100.0), (1.0853, 100.0)],
        ));
        assert_eq!(det.pending_orders(), 1);
    }

    #[test]
    fn test_cancellation_without_trade_fires() {
        let mut det = SpoofingDetector::new(5, 3.0);
        steady_books(&mut det, 20);
        det.on_orderbook(&book(
            2100,
            &[(1.0850, 100.0), (1.0849, 1000.0)],
            &[(1.0852, 100.0), (1.0853, 100.0)],
        ));
        // Oversized order vanishes with no trade near its price
        det.on_orderbook(&book(
            2200,
            &[(1.0850, 100.0), (1.0849, 100.0)],
            &[(1.0852, 100.0), (1.0853, 100.0)],
        ));
        let score = det.observe();
        assert!(det.is_anomaly(score));
        assert_eq!(det.spoofing_events(), 1);
        // One-shot: next observation is neutral again
        assert_eq!(det.observe(), 0.0);
    }

    #[test]
    fn test_consumed_order_does_not_fire() {
        let mut det = SpoofingDetector::new(5, 3.0);
        steady_books(&mut det, 20);
        det.on_orderbook(&book(
            2100,
            &[(1.0850, 100.0), (1.0849, 1000.0)],
            &[(1.0852, 100.0), (1.0853, 100.0)],
        ));
        // A trade executes at the tracked price before the order vanishes
        let trade = Trade::new(
            Ts::from_nanos(2150 * 1_000_000),
            Symbol::new(1),
            1.0849,
            1000.0,
            Some(Side::Sell),
            9,
        )
        .expect("valid trade");
        det.on_trade(&trade);
        det.on_orderbook(&book(
            2200,
            &[(1.0850, 100.0), (1.0849, 100.0)],
            &[(1.0852, 100.0), (1.0853, 100.0)],
        ));
        assert_eq!(det.observe(), 0.0);
        assert_eq!(det.spoofing_events(), 0);
    }

    #[test]
    fn test_persistent_large_order_not_spoofing() {
        let mut det = SpoofingDetector::new(5, 3.0);
        steady_books(&mut det, 20);
        // Large order appears and stays; never confirmed as a spoof
        for i in 0..5 {
            det.on_orderbook(&book(
                2100 + i * 100,
                &[(1.0850, 100.0), (1.0849, 1000.0)],
                &[(1.0852, 100.0), (1.0853, 100.0)],
            ));
            assert_eq!(det.observe(), 0.0);
        }
    }
}
