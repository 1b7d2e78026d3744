//! Price-impact and liquidity-cost estimators: Kyle's Lambda and Amihud

use std::collections::VecDeque;

/// Variance floor below which signed flow is treated as degenerate
const FLOW_VARIANCE_EPS: f64 = 1e-12;

/// Kyle's Lambda: regression slope of price change on signed order flow
///
/// Estimated by ordinary least squares over a rolling window of
/// (price change, signed volume) pairs. Higher lambda means higher price
/// impact per unit of flow, i.e. lower liquidity.
#[derive(Debug)]
pub struct KyleLambda {
    window_size: usize,
    min_observations: usize,
    pairs: VecDeque<(f64, f64)>,
}

impl KyleLambda {
    /// Create an estimator over `window_size` pairs requiring at least
    /// `min_observations` before producing a value
    #[must_use]
    pub fn new(window_size: usize, min_observations: usize) -> Self {
        Self {
            window_size: window_size.max(2),
            min_observations: min_observations.max(2),
            pairs: VecDeque::with_capacity(window_size.max(2)),
        }
    }

    /// Record one (price change, signed volume) observation
    pub fn add_observation(&mut self, price_change: f64, signed_volume: f64) {
        if !(price_change.is_finite() && signed_volume.is_finite()) {
            return;
        }
        if self.pairs.len() == self.window_size {
            self.pairs.pop_front();
        }
        self.pairs.push_back((price_change, signed_volume));
    }

    /// OLS slope Cov(dP, Q) / Var(Q)
    ///
    /// Absent below `min_observations` pairs or when the signed-flow
    /// variance is degenerate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lambda(&self) -> Option<f64> {
        let n = self.pairs.len();
        if n < self.min_observations {
            return None;
        }
        let nf = n as f64;
        let mean_dp = self.pairs.iter().map(|(dp, _)| dp).sum::<f64>() / nf;
        let mean_q = self.pairs.iter().map(|(_, q)| q).sum::<f64>() / nf;

        let mut cov = 0.0;
        let mut var = 0.0;
        for (dp, q) in &self.pairs {
            cov += (dp - mean_dp) * (q - mean_q);
            var += (q - mean_q) * (q - mean_q);
        }
        if var < FLOW_VARIANCE_EPS {
            return None;
        }
        Some(cov / var)
    }

    /// Number of pairs in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no pair has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Amihud illiquidity: rolling mean of |return| per unit of traded value
#[derive(Debug)]
pub struct AmihudIlliquidity {
    window_size: usize,
    ratios: VecDeque<f64>,
    last_price: Option<f64>,
}

impl AmihudIlliquidity {
    /// Create an estimator over `window_size` observations
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            ratios: VecDeque::with_capacity(window_size.max(1)),
            last_price: None,
        }
    }

    /// Record a (price, volume) observation
    ///
    /// Zero-volume observations advance the price reference but contribute
    /// no ratio; nothing is ever divided by zero.
    pub fn add_observation(&mut self, price: f64, volume: f64) {
        if !(price.is_finite() && volume.is_finite()) || price <= 0.0 {
            return;
        }
        if let Some(prev) = self.last_price {
            let traded_value = price * volume;
            if prev > 0.0 && traded_value > 0.0 {
                let ret = ((price - prev) / prev).abs();
                if self.ratios.len() == self.window_size {
                    self.ratios.pop_front();
                }
                self.ratios.push_back(ret / traded_value);
            }
        }
        self.last_price = Some(price);
    }

    /// Rolling mean illiquidity ratio; absent with no observations
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn illiquidity(&self) -> Option<f64> {
        if self.ratios.is_empty() {
            return None;
        }
        Some(self.ratios.iter().sum::<f64>() / self.ratios.len() as f64)
    }

    /// Number of ratios in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    /// True when no ratio has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}
