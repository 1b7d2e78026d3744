//! Order book depth, imbalance, price impact and liquidity scoring

use common::{OrderBook, Side};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Snapshots of total depth retained for depletion detection
const DEPTH_HISTORY: usize = 100;

/// Depth at which the depth component of the liquidity score saturates
const DEPTH_SCALE: f64 = 1_000.0;

/// Spread (bps) at which the spread component of the liquidity score halves
const SPREAD_SCALE_BPS: f64 = 5.0;

/// Liquidity score weights: depth vs. inverse spread
const DEPTH_WEIGHT: f64 = 0.5;
const SPREAD_WEIGHT: f64 = 0.5;

/// Aggregate depth of the current snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Total bid-side volume within the analyzed levels
    pub bid_depth: f64,
    /// Total ask-side volume within the analyzed levels
    pub ask_depth: f64,
    /// Combined volume
    pub total_depth: f64,
}

/// Simulated market-order walk result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceImpact {
    /// Volume-weighted average execution price over the filled portion
    pub average_price: f64,
    /// Signed difference between the average price and the pre-trade mid
    pub impact: f64,
    /// Volume actually filled by the walk
    pub filled: f64,
    /// False when the requested volume exceeded available depth
    pub fully_filled: bool,
}

/// Order book depth analyzer for one currency pair
///
/// Keeps the most recent snapshot truncated to `max_levels` per side plus a
/// short history of total depth and imbalance for trend detection.
#[derive(Debug)]
pub struct DepthAnalyzer {
    max_levels: usize,
    book: Option<OrderBook>,
    depth_history: VecDeque<f64>,
    imbalance_history: VecDeque<f64>,
}

impl DepthAnalyzer {
    /// Create an analyzer considering at most `max_levels` per side
    #[must_use]
    pub fn new(max_levels: usize) -> Self {
        Self {
            max_levels: max_levels.max(1),
            book: None,
            depth_history: VecDeque::with_capacity(DEPTH_HISTORY),
            imbalance_history: VecDeque::with_capacity(DEPTH_HISTORY),
        }
    }

    /// Record a snapshot, truncating to the configured depth
    pub fn add_orderbook(&mut self, orderbook: &OrderBook) {
        let mut book = orderbook.clone();
        book.truncate(self.max_levels);

        if self.depth_history.len() == DEPTH_HISTORY {
            self.depth_history.pop_front();
        }
        self.depth_history.push_back(book.total_depth());

        if self.imbalance_history.len() == DEPTH_HISTORY {
            self.imbalance_history.pop_front();
        }
        self.imbalance_history.push_back(book.imbalance());

        self.book = Some(book);
    }

    /// Latest truncated snapshot, when one has arrived
    #[must_use]
    pub fn current_book(&self) -> Option<&OrderBook> {
        self.book.as_ref()
    }

    /// Depth totals from the top `max_levels` of the latest snapshot
    #[must_use]
    pub fn current_depth(&self) -> Option<DepthSnapshot> {
        let book = self.book.as_ref()?;
        let bid_depth = book.bid_depth();
        let ask_depth = book.ask_depth();
        Some(DepthSnapshot {
            bid_depth,
            ask_depth,
            total_depth: bid_depth + ask_depth,
        })
    }

    /// Bid and ask size at a single level (0 = best)
    #[must_use]
    pub fn depth_at_level(&self, level: usize) -> Option<(f64, f64)> {
        let book = self.book.as_ref()?;
        let bid = book.bids().get(level)?;
        let ask = book.asks().get(level)?;
        Some((bid.size.as_f64(), ask.size.as_f64()))
    }

    /// Cumulative (bid, ask) volume over the first `num_levels`
    #[must_use]
    pub fn cumulative_depth(&self, num_levels: usize) -> Option<(f64, f64)> {
        let book = self.book.as_ref()?;
        let n = num_levels.min(self.max_levels);
        let bid: f64 = book.bids().iter().take(n).map(|l| l.size.as_f64()).sum();
        let ask: f64 = book.asks().iter().take(n).map(|l| l.size.as_f64()).sum();
        Some((bid, ask))
    }

    /// Depth imbalance over the first `num_levels`, in [-1, 1]
    ///
    /// Exactly 0 when the considered levels hold no volume.
    #[must_use]
    pub fn depth_imbalance(&self, num_levels: usize) -> Option<f64> {
        let (bid, ask) = self.cumulative_depth(num_levels)?;
        let total = bid + ask;
        if total == 0.0 {
            Some(0.0)
        } else {
            Some((bid - ask) / total)
        }
    }

    /// Change between the latest imbalance and the mean of the history
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn imbalance_trend(&self) -> Option<f64> {
        let n = self.imbalance_history.len();
        if n < 2 {
            return None;
        }
        let latest = self.imbalance_history[n - 1];
        let mean = self.imbalance_history.iter().take(n - 1).sum::<f64>() / (n - 1) as f64;
        Some(latest - mean)
    }

    /// Volume-weighted mid price over the first `num_levels`
    #[must_use]
    pub fn weighted_mid_price(&self, num_levels: usize) -> Option<f64> {
        let book = self.book.as_ref()?;
        let n = num_levels.min(self.max_levels);
        let mut value = 0.0;
        let mut volume = 0.0;
        for level in book.bids().iter().take(n).chain(book.asks().iter().take(n)) {
            value += level.price.as_f64() * level.size.as_f64();
            volume += level.size.as_f64();
        }
        if volume == 0.0 { None } else { Some(value / volume) }
    }

    /// Walk the book consuming `volume` on the given side
    ///
    /// Buys consume asks, sells consume bids. When the requested volume
    /// exceeds available depth, the result is flagged `fully_filled: false`
    /// and carries the best achievable average price.
    #[must_use]
    pub fn price_impact(&self, volume: f64, side: Side) -> Option<PriceImpact> {
        if volume <= 0.0 {
            return None;
        }
        let book = self.book.as_ref()?;
        let levels = match side {
            Side::Buy => book.asks(),
            Side::Sell => book.bids(),
        };
        let best_bid = book.bids().first()?.price.as_f64();
        let best_ask = book.asks().first()?.price.as_f64();
        let mid = (best_bid + best_ask) / 2.0;

        let mut remaining = volume;
        let mut cost = 0.0;
        for level in levels {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(level.size.as_f64());
            cost += take * level.price.as_f64();
            remaining -= take;
        }

        let filled = volume - remaining;
        if filled <= 0.0 {
            return None;
        }
        let average_price = cost / filled;
        Some(PriceImpact {
            average_price,
            impact: average_price - mid,
            filled,
            fully_filled: remaining <= 0.0,
        })
    }

    /// Composite liquidity score in [0, 1]
    ///
    /// Fixed-weight blend of a saturating depth score and an inverse spread
    /// score. More depth or a tighter spread never lowers the score.
    #[must_use]
    pub fn liquidity_score(&self, num_levels: usize) -> Option<f64> {
        let book = self.book.as_ref()?;
        let (bid, ask) = self.cumulative_depth(num_levels)?;
        let best_bid = book.bids().first()?.price.as_f64();
        let best_ask = book.asks().first()?.price.as_f64();
        let mid = (best_bid + best_ask) / 2.0;
        if mid <= 0.0 {
            return None;
        }
        let spread_bps = (best_ask - best_bid) / mid * 10_000.0;

        let total = bid + ask;
        let depth_score = total / (total + DEPTH_SCALE);
        let spread_score = SPREAD_SCALE_BPS / (SPREAD_SCALE_BPS + spread_bps.max(0.0));

        Some(DEPTH_WEIGHT * depth_score + SPREAD_WEIGHT * spread_score)
    }

    /// True when current total depth has fallen below `ratio` times the
    /// rolling average depth
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect_depth_depletion(&self, ratio: f64) -> bool {
        let n = self.depth_history.len();
        if n < 10 {
            return false;
        }
        let current = self.depth_history[n - 1];
        let mean = self.depth_history.iter().take(n - 1).sum::<f64>() / (n - 1) as f64;
        mean > 0.0 && current < mean * ratio
    }
}
