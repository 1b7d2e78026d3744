//! Core types for the FX market surveillance platform
//!
//! Fixed-point value types at the event boundary, validated event models,
//! and the metrics snapshot handed to the storage/presentation layers.

pub mod errors;
pub mod market;
pub mod types;

pub use errors::MarketDataError;
pub use market::{
    AnomalyKind, MarketEvent, MetricsSnapshot, OrderBook, OrderBookLevel, Side, Tick, Trade,
};
pub use types::{Px, Qty, Symbol, Ts};
