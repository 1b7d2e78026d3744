//! Wash trading detection: opposing trades of near-equal price and size

use common::{Side, Trade, Ts};
use std::collections::VecDeque;
use tracing::warn;

/// Absolute price tolerance for a matching pair
const PRICE_TOLERANCE: f64 = 1e-4;

/// Relative size tolerance for a matching pair
const SIZE_TOLERANCE: f64 = 0.10;

/// Hard cap on retained trades so matching stays bounded
const MAX_TRADES: usize = 512;

#[derive(Debug, Clone, Copy)]
struct WashTrade {
    ts: Ts,
    price: f64,
    size: f64,
    side: Side,
}

/// Matches opposing-side trades of near-equal price and size within a
/// sliding time window; fires when matched volume dominates total volume
#[derive(Debug)]
pub struct WashTradingDetector {
    window_nanos: u64,
    ratio_threshold: f64,
    trades: VecDeque<WashTrade>,
    wash_events: u64,
}

impl WashTradingDetector {
    /// Create a detector over `window_seconds`, firing when the matched
    /// volume ratio exceeds `ratio_threshold`
    #[must_use]
    pub fn new(window_seconds: u64, ratio_threshold: f64) -> Self {
        Self {
            window_nanos: window_seconds.max(1) * 1_000_000_000,
            ratio_threshold: ratio_threshold.clamp(0.0, 1.0),
            trades: VecDeque::new(),
            wash_events: 0,
        }
    }

    /// Record a classified trade; unclassified trades cannot participate
    pub fn on_trade(&mut self, trade: &Trade) {
        let Some(side) = trade.side else {
            return;
        };
        let size = trade.size().as_f64();
        if size <= 0.0 {
            return;
        }
        if self.trades.len() == MAX_TRADES {
            self.trades.pop_front();
        }
        self.trades.push_back(WashTrade {
            ts: trade.ts(),
            price: trade.price().as_f64(),
            size,
            side,
        });
        let cutoff = trade.ts().as_nanos().saturating_sub(self.window_nanos);
        while let Some(front) = self.trades.front() {
            if front.ts.as_nanos() < cutoff {
                self.trades.pop_front();
            } else {
                break;
            }
        }
    }

    /// Ratio of matched volume to total volume in the current window
    ///
    /// Each trade participates in at most one pair (greedy in arrival
    /// order). 0 when the window holds no volume.
    #[must_use]
    pub fn matched_volume_ratio(&self) -> f64 {
        let total: f64 = self.trades.iter().map(|t| t.size).sum();
        if total <= 0.0 {
            return 0.0;
        }

        let trades: Vec<&WashTrade> = self.trades.iter().collect();
        let mut matched = vec![false; trades.len()];
        let mut matched_volume = 0.0;

        for i in 0..trades.len() {
            if matched[i] {
                continue;
            }
            for j in (i + 1)..trades.len() {
                if matched[j] || trades[i].side == trades[j].side {
                    continue;
                }
                if Self::is_matching_pair(trades[i], trades[j]) {
                    matched[i] = true;
                    matched[j] = true;
                    matched_volume += trades[i].size + trades[j].size;
                    break;
                }
            }
        }

        (matched_volume / total).min(1.0)
    }

    fn is_matching_pair(a: &WashTrade, b: &WashTrade) -> bool {
        if (a.price - b.price).abs() > PRICE_TOLERANCE {
            return false;
        }
        let avg_size = (a.size + b.size) / 2.0;
        if avg_size <= 0.0 || (a.size - b.size).abs() / avg_size > SIZE_TOLERANCE {
            return false;
        }
        true
    }

    /// Score in [0, 1]: the matched volume ratio itself
    pub fn observe(&mut self) -> f64 {
        let ratio = self.matched_volume_ratio();
        if self.is_anomaly(ratio) {
            self.wash_events += 1;
            warn!(ratio, "wash trading pattern detected");
        }
        ratio
    }

    /// True when the matched ratio exceeds the configured threshold
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > self.ratio_threshold
    }

    /// Trades currently retained in the window
    #[must_use]
    pub fn trades_in_window(&self) -> usize {
        self.trades.len()
    }

    /// Windows that fired so far
    #[must_use]
    pub const fn wash_events(&self) -> u64 {
        self.wash_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Symbol;

    fn trade(ts_ms: u64, price: f64, size: f64, side: Side) -> Trade {
        Trade::new(
            Ts::from_nanos(ts_ms * 1_000_000),
            Symbol::new(1),
            price,
            size,
            Some(side),
            ts_ms,
        )
        .expect("valid trade")
    }

    #[test]
    fn test_empty_window_zero_ratio() {
        let det = WashTradingDetector::new(60, 0.5);
        assert_eq!(det.matched_volume_ratio(), 0.0);
    }

    #[test]
    fn test_circular_pair_matches() {
        let mut det = WashTradingDetector::new(60, 0.5);
        det.on_trade(&trade(1, 1.0851, 100.0, Side::Buy));
        det.on_trade(&trade(2, 1.0851, 100.0, Side::Sell));
        let score = det.observe();
        assert!((score - 1.0).abs() < 1e-9);
        assert!(det.is_anomaly(score));
    }

    #[test]
    fn test_one_sided_flow_no_match() {
        let mut det = WashTradingDetector::new(60, 0.5);
        for i in 0..10 {
            det.on_trade(&trade(i, 1.0851, 100.0, Side::Buy));
        }
        assert_eq!(det.observe(), 0.0);
    }

    #[test]
    fn test_size_mismatch_no_match() {
        let mut det = WashTradingDetector::new(60, 0.5);
        det.on_trade(&trade(1, 1.0851, 100.0, Side::Buy));
        det.on_trade(&trade(2, 1.0851, 200.0, Side::Sell));
        assert_eq!(det.matched_volume_ratio(), 0.0);
    }

    #[test]
    fn test_price_mismatch_no_match() {
        let mut det = WashTradingDetector::new(60, 0.5);
        det.on_trade(&trade(1, 1.0851, 100.0, Side::Buy));
        det.on_trade(&trade(2, 1.0951, 100.0, Side::Sell));
        assert_eq!(det.matched_volume_ratio(), 0.0);
    }

    #[test]
    fn test_partial_wash_below_threshold() {
        let mut det = WashTradingDetector::new(60, 0.5);
        // One matched pair (200 units) against 800 units of one-sided flow
        det.on_trade(&trade(1, 1.0851, 100.0, Side::Buy));
        det.on_trade(&trade(2, 1.0851, 100.0, Side::Sell));
        for i in 3..11 {
            det.on_trade(&trade(i, 1.0900, 100.0, Side::Buy));
        }
        let score = det.observe();
        assert!((score - 0.2).abs() < 1e-9);
        assert!(!det.is_anomaly(score));
    }

    #[test]
    fn test_unclassified_trades_ignored() {
        let mut det = WashTradingDetector::new(60, 0.5);
        let t = Trade::new(Ts::from_secs(1), Symbol::new(1), 1.0851, 100.0, None, 1)
            .expect("valid trade");
        det.on_trade(&t);
        assert_eq!(det.trades_in_window(), 0);
    }

    #[test]
    fn test_window_expiry() {
        let mut det = WashTradingDetector::new(1, 0.5);
        det.on_trade(&trade(0, 1.0851, 100.0, Side::Buy));
        // Three seconds later: the buy has expired, nothing to match
        det.on_trade(&trade(3000, 1.0851, 100.0, Side::Sell));
        assert_eq!(det.matched_volume_ratio(), 0.0);
    }
}
