//! Market data event models and the aggregated metrics snapshot
//!
//! Events are transient: constructed once per message, validated at the
//! boundary, consumed by the per-symbol aggregator and then discarded.

use crate::errors::MarketDataError;
use crate::types::{Px, Qty, Symbol, Ts};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis points per unit of relative price
const BPS: f64 = 10_000.0;

/// Trade aggressor side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buyer-initiated
    Buy,
    /// Seller-initiated
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A single top-of-book quote update
///
/// Derived fields are computed once at construction; a tick that fails
/// validation is rejected, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    ts: Ts,
    symbol: Symbol,
    bid: Px,
    ask: Px,
    bid_size: Qty,
    ask_size: Qty,
    mid_price: f64,
    spread: f64,
    spread_bps: f64,
}

impl Tick {
    /// Validate and build a tick, computing the derived fields
    ///
    /// # Errors
    /// Returns `MalformedEvent` when inputs are non-finite, the quote is
    /// crossed (`ask < bid`), the bid is not strictly positive, or a size
    /// is negative.
    pub fn new(
        ts: Ts,
        symbol: Symbol,
        bid: f64,
        ask: f64,
        bid_size: f64,
        ask_size: f64,
    ) -> Result<Self, MarketDataError> {
        if !(bid.is_finite() && ask.is_finite() && bid_size.is_finite() && ask_size.is_finite()) {
            return Err(MarketDataError::MalformedEvent(format!(
                "non-finite tick fields for {symbol}"
            )));
        }
        if bid <= 0.0 {
            return Err(MarketDataError::MalformedEvent(format!(
                "non-positive bid {bid} for {symbol}"
            )));
        }
        if ask < bid {
            return Err(MarketDataError::MalformedEvent(format!(
                "crossed quote {bid}/{ask} for {symbol}"
            )));
        }
        if bid_size < 0.0 || ask_size < 0.0 {
            return Err(MarketDataError::MalformedEvent(format!(
                "negative size on tick for {symbol}"
            )));
        }

        let bid = Px::new(bid);
        let ask = Px::new(ask);
        // Derived from raw ticks in one rounding step so that a trade price
        // equal to the midpoint compares equal in f64
        #[allow(clippy::cast_precision_loss)]
        let mid_price = (bid.as_i64() + ask.as_i64()) as f64 / 20_000.0;
        #[allow(clippy::cast_precision_loss)]
        let spread = (ask.as_i64() - bid.as_i64()) as f64 / 10_000.0;
        let spread_bps = if mid_price > 0.0 {
            spread / mid_price * BPS
        } else {
            0.0
        };

        Ok(Self {
            ts,
            symbol,
            bid,
            ask,
            bid_size: Qty::new(bid_size),
            ask_size: Qty::new(ask_size),
            mid_price,
            spread,
            spread_bps,
        })
    }

    /// Event timestamp
    #[must_use]
    pub const fn ts(&self) -> Ts {
        self.ts
    }

    /// Currency pair
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Bid price
    #[must_use]
    pub const fn bid(&self) -> Px {
        self.bid
    }

    /// Ask price
    #[must_use]
    pub const fn ask(&self) -> Px {
        self.ask
    }

    /// Bid volume
    #[must_use]
    pub const fn bid_size(&self) -> Qty {
        self.bid_size
    }

    /// Ask volume
    #[must_use]
    pub const fn ask_size(&self) -> Qty {
        self.ask_size
    }

    /// Quote midpoint
    #[must_use]
    pub const fn mid_price(&self) -> f64 {
        self.mid_price
    }

    /// Bid-ask spread
    #[must_use]
    pub const fn spread(&self) -> f64 {
        self.spread
    }

    /// Spread in basis points of the mid price
    #[must_use]
    pub const fn spread_bps(&self) -> f64 {
        self.spread_bps
    }
}

/// One price level of an order book side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price of the level
    pub price: Px,
    /// Resting volume at the level
    pub size: Qty,
    /// Number of orders at the level
    pub orders: u32,
}

impl OrderBookLevel {
    /// Build a level from f64 inputs
    #[must_use]
    pub fn new(price: f64, size: f64, orders: u32) -> Self {
        Self {
            price: Px::new(price),
            size: Qty::new(size),
            orders,
        }
    }
}

/// A full order book snapshot for one currency pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    ts: Ts,
    symbol: Symbol,
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Validate and build an order book snapshot
    ///
    /// Bids must be in descending price order and asks ascending; sizes
    /// must be non-negative and prices positive.
    ///
    /// # Errors
    /// Returns `MalformedEvent` on any violation.
    pub fn new(
        ts: Ts,
        symbol: Symbol,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
    ) -> Result<Self, MarketDataError> {
        Self::validate_side(symbol, &bids, true)?;
        Self::validate_side(symbol, &asks, false)?;
        Ok(Self {
            ts,
            symbol,
            bids,
            asks,
        })
    }

    fn validate_side(
        symbol: Symbol,
        levels: &[OrderBookLevel],
        descending: bool,
    ) -> Result<(), MarketDataError> {
        for level in levels {
            if !level.price.is_positive() {
                return Err(MarketDataError::MalformedEvent(format!(
                    "non-positive book level price for {symbol}"
                )));
            }
            if level.size.as_i64() < 0 {
                return Err(MarketDataError::MalformedEvent(format!(
                    "negative book level size for {symbol}"
                )));
            }
        }
        let ordered = levels.windows(2).all(|w| {
            if descending {
                w[0].price >= w[1].price
            } else {
                w[0].price <= w[1].price
            }
        });
        if !ordered {
            return Err(MarketDataError::MalformedEvent(format!(
                "unsorted book side for {symbol}"
            )));
        }
        Ok(())
    }

    /// Snapshot timestamp
    #[must_use]
    pub const fn ts(&self) -> Ts {
        self.ts
    }

    /// Currency pair
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Bid levels, best first
    #[must_use]
    pub fn bids(&self) -> &[OrderBookLevel] {
        &self.bids
    }

    /// Ask levels, best first
    #[must_use]
    pub fn asks(&self) -> &[OrderBookLevel] {
        &self.asks
    }

    /// Total resting volume on the bid side
    #[must_use]
    pub fn bid_depth(&self) -> f64 {
        self.bids.iter().map(|l| l.size.as_f64()).sum()
    }

    /// Total resting volume on the ask side
    #[must_use]
    pub fn ask_depth(&self) -> f64 {
        self.asks.iter().map(|l| l.size.as_f64()).sum()
    }

    /// Combined depth of both sides
    #[must_use]
    pub fn total_depth(&self) -> f64 {
        self.bid_depth() + self.ask_depth()
    }

    /// Normalized bid/ask depth imbalance in [-1, 1], 0 at zero depth
    #[must_use]
    pub fn imbalance(&self) -> f64 {
        let bid = self.bid_depth();
        let ask = self.ask_depth();
        let total = bid + ask;
        if total == 0.0 {
            0.0
        } else {
            (bid - ask) / total
        }
    }

    /// Drop levels beyond `max_levels` on each side
    pub fn truncate(&mut self, max_levels: usize) {
        self.bids.truncate(max_levels);
        self.asks.truncate(max_levels);
    }
}

/// A completed trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    ts: Ts,
    symbol: Symbol,
    price: Px,
    size: Qty,
    /// Aggressor side; absent until the classifier fills it in
    pub side: Option<Side>,
    trade_id: u64,
}

impl Trade {
    /// Validate and build a trade
    ///
    /// # Errors
    /// Returns `MalformedEvent` when price/size are non-finite, the price
    /// is not strictly positive, or the size is negative.
    pub fn new(
        ts: Ts,
        symbol: Symbol,
        price: f64,
        size: f64,
        side: Option<Side>,
        trade_id: u64,
    ) -> Result<Self, MarketDataError> {
        if !(price.is_finite() && size.is_finite()) {
            return Err(MarketDataError::MalformedEvent(format!(
                "non-finite trade fields for {symbol}"
            )));
        }
        if price <= 0.0 {
            return Err(MarketDataError::MalformedEvent(format!(
                "non-positive trade price {price} for {symbol}"
            )));
        }
        if size < 0.0 {
            return Err(MarketDataError::MalformedEvent(format!(
                "negative trade size for {symbol}"
            )));
        }
        Ok(Self {
            ts,
            symbol,
            price: Px::new(price),
            size: Qty::new(size),
            side,
            trade_id,
        })
    }

    /// Trade timestamp
    #[must_use]
    pub const fn ts(&self) -> Ts {
        self.ts
    }

    /// Currency pair
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Execution price
    #[must_use]
    pub const fn price(&self) -> Px {
        self.price
    }

    /// Executed volume
    #[must_use]
    pub const fn size(&self) -> Qty {
        self.size
    }

    /// Exchange-assigned trade identifier
    #[must_use]
    pub const fn trade_id(&self) -> u64 {
        self.trade_id
    }
}

/// Routing envelope at the transport boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Top-of-book quote update
    Tick(Tick),
    /// Full book snapshot
    OrderBook(OrderBook),
    /// Completed trade
    Trade(Trade),
}

impl MarketEvent {
    /// Currency pair the event belongs to
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        match self {
            Self::Tick(t) => t.symbol(),
            Self::OrderBook(ob) => ob.symbol(),
            Self::Trade(t) => t.symbol(),
        }
    }

    /// Event timestamp
    #[must_use]
    pub const fn ts(&self) -> Ts {
        match self {
            Self::Tick(t) => t.ts(),
            Self::OrderBook(ob) => ob.ts(),
            Self::Trade(t) => t.ts(),
        }
    }
}

/// Which ensemble member attributed an anomaly
///
/// Variant order is the ensemble tie-break priority: manipulation
/// heuristics ahead of statistical detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Excessive quoting rate
    QuoteStuffing,
    /// Circular self-trading
    WashTrading,
    /// Oversized resting orders canceled before execution
    Spoofing,
    /// Rolling z-score breach
    ZScore,
    /// Half-space tree mass deficit
    HalfSpaceTrees,
    /// Isolation-forest path-length outlier
    IsolationForest,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QuoteStuffing => "quote_stuffing",
            Self::WashTrading => "wash_trading",
            Self::Spoofing => "spoofing",
            Self::ZScore => "zscore",
            Self::HalfSpaceTrees => "half_space_trees",
            Self::IsolationForest => "isolation_forest",
        };
        write!(f, "{name}")
    }
}

/// One aggregated metrics record, produced per processed event
///
/// Written verbatim into the metrics storage table and read verbatim by
/// the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Timestamp of the triggering event
    pub ts: Ts,
    /// Currency pair
    pub symbol: Symbol,
    /// Current bid-ask spread
    pub bid_ask_spread: f64,
    /// Spread in basis points
    pub spread_bps: f64,
    /// Total bid-side depth
    pub bid_depth: f64,
    /// Total ask-side depth
    pub ask_depth: f64,
    /// Combined depth
    pub total_depth: f64,
    /// Rolling order-flow imbalance
    pub order_flow_imbalance: f64,
    /// Realized volatility, absent until the window warms up
    pub volatility: Option<f64>,
    /// True when at least one detector fired
    pub is_anomaly: bool,
    /// Winning detector, when any fired
    pub anomaly_type: Option<AnomalyKind>,
    /// Winning detector's score, when any fired
    pub anomaly_score: Option<f64>,
}
