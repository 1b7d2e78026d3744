//! Error types for the surveillance core

use crate::types::{Symbol, Ts};
use thiserror::Error;

/// Errors raised while ingesting market data events
///
/// None of these are fatal: a symbol's processing unit keeps accepting
/// subsequent valid events after any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketDataError {
    /// Event failed validation (non-finite price, crossed quote, negative size)
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Event timestamp is not strictly after the last accepted event
    #[error("out-of-order event for {symbol}: {event_ts} <= {last_ts}")]
    OutOfOrderEvent {
        /// Symbol whose ordering was violated
        symbol: Symbol,
        /// Timestamp of the rejected event
        event_ts: Ts,
        /// Timestamp of the last accepted event
        last_ts: Ts,
    },
}
