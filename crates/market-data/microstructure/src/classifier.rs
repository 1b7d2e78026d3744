//! Lee-Ready trade-side classification

use common::{Side, Tick, Trade};
use tracing::debug;

/// Lee-Ready trade classifier
///
/// Quote rule against the prevailing midpoint, falling back to the tick
/// test at the midpoint, carrying the previous classification on a zero
/// tick. Feeds the flow-imbalance and wash-trading components.
#[derive(Debug, Default)]
pub struct LeeReadyClassifier {
    previous_trade_price: Option<f64>,
    previous_classification: Option<Side>,
    buy_initiated: u64,
    sell_initiated: u64,
    unclassified: u64,
}

impl LeeReadyClassifier {
    /// Create a classifier with no history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a trade against the prevailing quote
    ///
    /// Returns `None` when neither rule applies: trade at the midpoint, at
    /// the previous trade price, with no earlier classification to carry.
    pub fn classify(&mut self, trade: &Trade, prevailing_quote: &Tick) -> Option<Side> {
        let mid = prevailing_quote.mid_price();
        let price = trade.price().as_f64();

        let side = if price > mid {
            Some(Side::Buy)
        } else if price < mid {
            Some(Side::Sell)
        } else {
            self.tick_test(price)
        };

        match side {
            Some(Side::Buy) => self.buy_initiated += 1,
            Some(Side::Sell) => self.sell_initiated += 1,
            None => {
                self.unclassified += 1;
                debug!(
                    symbol = %trade.symbol(),
                    trade_id = trade.trade_id(),
                    "trade left unclassified: no tick-test history"
                );
            }
        }

        self.previous_trade_price = Some(price);
        if side.is_some() {
            self.previous_classification = side;
        }
        side
    }

    fn tick_test(&self, price: f64) -> Option<Side> {
        let prev = self.previous_trade_price?;
        if price > prev {
            Some(Side::Buy)
        } else if price < prev {
            Some(Side::Sell)
        } else {
            self.previous_classification
        }
    }

    /// Buyer-initiated count
    #[must_use]
    pub const fn buy_initiated(&self) -> u64 {
        self.buy_initiated
    }

    /// Seller-initiated count
    #[must_use]
    pub const fn sell_initiated(&self) -> u64 {
        self.sell_initiated
    }

    /// Trades left unclassified
    #[must_use]
    pub const fn unclassified(&self) -> u64 {
        self.unclassified
    }

    /// Imbalance of classified counts in [-1, 1], 0 with no history
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn flow_imbalance(&self) -> f64 {
        let total = self.buy_initiated + self.sell_initiated;
        if total == 0 {
            0.0
        } else {
            (self.buy_initiated as f64 - self.sell_initiated as f64) / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Symbol, Ts};

    fn quote(bid: f64, ask: f64) -> Tick {
        Tick::new(Ts::from_secs(1), Symbol::new(1), bid, ask, 100.0, 100.0).expect("valid tick")
    }

    fn trade(price: f64) -> Trade {
        Trade::new(Ts::from_secs(1), Symbol::new(1), price, 10.0, None, 1).expect("valid trade")
    }

    #[test]
    fn test_quote_rule_above_mid_is_buy() {
        let mut classifier = LeeReadyClassifier::new();
        let side = classifier.classify(&trade(1.0852), &quote(1.0850, 1.0852));
        assert_eq!(side, Some(Side::Buy));
    }

    #[test]
    fn test_quote_rule_below_mid_is_sell() {
        let mut classifier = LeeReadyClassifier::new();
        let side = classifier.classify(&trade(1.0850), &quote(1.0850, 1.0852));
        assert_eq!(side, Some(Side::Sell));
    }

    #[test]
    fn test_tick_test_uptick_is_buy() {
        let mut classifier = LeeReadyClassifier::new();
        // Establish a lower previous trade price
        classifier.classify(&trade(1.0850), &quote(1.0850, 1.0852));
        // At midpoint with previous price lower: uptick, buy
        let side = classifier.classify(&trade(1.0851), &quote(1.0850, 1.0852));
        assert_eq!(side, Some(Side::Buy));
    }

    #[test]
    fn test_tick_test_downtick_is_sell() {
        let mut classifier = LeeReadyClassifier::new();
        classifier.classify(&trade(1.0852), &quote(1.0850, 1.0852));
        let side = classifier.classify(&trade(1.0851), &quote(1.0850, 1.0852));
        assert_eq!(side, Some(Side::Sell));
    }

    #[test]
    fn test_zero_tick_carries_previous() {
        let mut classifier = LeeReadyClassifier::new();
        classifier.classify(&trade(1.0850), &quote(1.0850, 1.0852)); // sell
        classifier.classify(&trade(1.0851), &quote(1.0850, 1.0852)); // uptick buy
        // Same price at midpoint again: carry the buy
        let side = classifier.classify(&trade(1.0851), &quote(1.0850, 1.0852));
        assert_eq!(side, Some(Side::Buy));
    }

    #[test]
    fn test_midpoint_without_history_is_unknown() {
        let mut classifier = LeeReadyClassifier::new();
        let side = classifier.classify(&trade(1.0851), &quote(1.0850, 1.0852));
        assert_eq!(side, None);
        assert_eq!(classifier.unclassified(), 1);
    }

    #[test]
    fn test_flow_imbalance_counts() {
        let mut classifier = LeeReadyClassifier::new();
        classifier.classify(&trade(1.0852), &quote(1.0850, 1.0852)); // buy
        classifier.classify(&trade(1.0852), &quote(1.0850, 1.0852)); // buy
        classifier.classify(&trade(1.0850), &quote(1.0850, 1.0852)); // sell
        let imbalance = classifier.flow_imbalance();
        assert!((imbalance - 1.0 / 3.0).abs() < 1e-9);
    }
}
