//! Per-event feature vector scored by the ensemble

use serde::{Deserialize, Serialize};

/// Derived features of one event, in a fixed dimension order
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Quote midpoint
    pub mid_price: f64,
    /// Bid-ask spread
    pub spread: f64,
    /// Spread in basis points
    pub spread_bps: f64,
    /// Total bid-side depth
    pub bid_depth: f64,
    /// Total ask-side depth
    pub ask_depth: f64,
    /// Combined depth
    pub total_depth: f64,
    /// Rolling order-flow imbalance
    pub flow_imbalance: f64,
    /// Realized volatility, 0 until the window warms up
    pub volatility: f64,
}

impl FeatureVector {
    /// Number of dimensions
    pub const DIM: usize = 8;

    /// Dense array view in the fixed dimension order
    #[must_use]
    pub const fn as_array(&self) -> [f64; Self::DIM] {
        [
            self.mid_price,
            self.spread,
            self.spread_bps,
            self.bid_depth,
            self.ask_depth,
            self.total_depth,
            self.flow_imbalance,
            self.volatility,
        ]
    }

    /// Read one scalar dimension
    #[must_use]
    pub const fn scalar(&self, feature: ScalarFeature) -> f64 {
        match feature {
            ScalarFeature::MidPrice => self.mid_price,
            ScalarFeature::Spread => self.spread,
            ScalarFeature::SpreadBps => self.spread_bps,
            ScalarFeature::TotalDepth => self.total_depth,
            ScalarFeature::FlowImbalance => self.flow_imbalance,
            ScalarFeature::Volatility => self.volatility,
        }
    }
}

/// Scalar dimensions a univariate detector can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarFeature {
    /// Quote midpoint
    MidPrice,
    /// Bid-ask spread
    Spread,
    /// Spread in basis points
    SpreadBps,
    /// Combined book depth
    TotalDepth,
    /// Rolling order-flow imbalance
    FlowImbalance,
    /// Realized volatility
    Volatility,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_order_matches_scalars() {
        let fv = FeatureVector {
            mid_price: 1.0,
            spread: 2.0,
            spread_bps: 3.0,
            bid_depth: 4.0,
            ask_depth: 5.0,
            total_depth: 9.0,
            flow_imbalance: 0.5,
            volatility: 0.1,
        };
        let arr = fv.as_array();
        assert_eq!(arr[0], fv.scalar(ScalarFeature::MidPrice));
        assert_eq!(arr[2], fv.scalar(ScalarFeature::SpreadBps));
        assert_eq!(arr[5], fv.scalar(ScalarFeature::TotalDepth));
        assert_eq!(arr.len(), FeatureVector::DIM);
    }
}
