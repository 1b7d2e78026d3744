//! Rolling bid-ask spread statistics

use common::Tick;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct SpreadSample {
    spread: f64,
    spread_bps: f64,
}

/// Rolling spread calculator over the last `window_size` ticks
#[derive(Debug)]
pub struct SpreadCalculator {
    window_size: usize,
    samples: VecDeque<SpreadSample>,
    last_mid: Option<f64>,
}

impl SpreadCalculator {
    /// Create a calculator keeping the most recent `window_size` ticks
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            samples: VecDeque::with_capacity(window_size.max(1)),
            last_mid: None,
        }
    }

    /// Record a tick, evicting the oldest sample when the window is full
    pub fn add_tick(&mut self, tick: &Tick) {
        if self.samples.len() == self.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back(SpreadSample {
            spread: tick.spread(),
            spread_bps: tick.spread_bps(),
        });
        self.last_mid = Some(tick.mid_price());
    }

    /// Spread of the most recent tick
    #[must_use]
    pub fn current_spread(&self) -> Option<f64> {
        self.samples.back().map(|s| s.spread)
    }

    /// Spread of the most recent tick in basis points
    #[must_use]
    pub fn current_spread_bps(&self) -> Option<f64> {
        self.samples.back().map(|s| s.spread_bps)
    }

    /// Mean spread over the window; absent below 2 samples
    #[must_use]
    pub fn average_spread(&self) -> Option<f64> {
        Self::mean(self.samples.iter().map(|s| s.spread), self.samples.len())
    }

    /// Mean spread in basis points over the window; absent below 2 samples
    #[must_use]
    pub fn average_spread_bps(&self) -> Option<f64> {
        Self::mean(self.samples.iter().map(|s| s.spread_bps), self.samples.len())
    }

    /// Sample standard deviation of spreads; absent below 2 samples
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn spread_volatility(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let mean = self.samples.iter().map(|s| s.spread).sum::<f64>() / n as f64;
        let var = self
            .samples
            .iter()
            .map(|s| {
                let d = s.spread - mean;
                d * d
            })
            .sum::<f64>()
            / (n - 1) as f64;
        Some(var.sqrt())
    }

    /// Spread of the latest tick relative to its mid price
    #[must_use]
    pub fn relative_spread(&self) -> Option<f64> {
        let spread = self.current_spread()?;
        let mid = self.last_mid?;
        if mid > 0.0 { Some(spread / mid) } else { None }
    }

    /// Effective spread for an execution at `trade_price`: 2 * |price - mid|
    #[must_use]
    pub fn effective_spread(&self, trade_price: f64) -> Option<f64> {
        self.last_mid.map(|mid| 2.0 * (trade_price - mid).abs())
    }

    /// True when the newest spread exceeds `threshold_multiplier` times the
    /// mean of the prior window entries (the newest sample excluded)
    ///
    /// False below 2 samples or when the prior mean is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect_spread_widening(&self, threshold_multiplier: f64) -> bool {
        let n = self.samples.len();
        if n < 2 {
            return false;
        }
        let current = self.samples[n - 1].spread;
        let prior_mean =
            self.samples.iter().take(n - 1).map(|s| s.spread).sum::<f64>() / (n - 1) as f64;
        if prior_mean <= 0.0 {
            return false;
        }
        current > prior_mean * threshold_multiplier
    }

    /// Number of ticks currently in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no tick has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(values: impl Iterator<Item = f64>, n: usize) -> Option<f64> {
        if n < 2 {
            return None;
        }
        Some(values.sum::<f64>() / n as f64)
    }
}
