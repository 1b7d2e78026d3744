//! Realized and EWMA volatility, clustering and regime classification

use common::{Tick, Ts};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Trading seconds per year used for annualization (252 trading days)
const SECONDS_PER_YEAR: f64 = 252.0 * 24.0 * 3600.0;

/// Minimum returns before clustering/regime classification is attempted
const MIN_REGIME_SAMPLES: usize = 20;

/// Sub-window length for rolling volatility estimates
const SUB_WINDOW: usize = 10;

/// Percentile bands for the regime partition
const LOW_BAND_PCT: f64 = 0.30;
const HIGH_BAND_PCT: f64 = 0.70;

/// Default EWMA decay used by the regime classifier
const REGIME_EWMA_LAMBDA: f64 = 0.94;

/// Volatility regime relative to the window's own history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityRegime {
    /// Below the low percentile band
    Low,
    /// Between the bands
    Normal,
    /// Above the high percentile band
    High,
}

/// Log-return volatility analyzer over a bounded tick window
#[derive(Debug)]
pub struct VolatilityAnalyzer {
    window_size: usize,
    returns: VecDeque<f64>,
    /// ln(ask/bid)^2 per tick, for the Parkinson range estimator
    hl_ranges: VecDeque<f64>,
    timestamps: VecDeque<Ts>,
    last_mid: Option<f64>,
}

impl VolatilityAnalyzer {
    /// Create an analyzer keeping `window_size` returns
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let cap = window_size.max(2);
        Self {
            window_size: cap,
            returns: VecDeque::with_capacity(cap),
            hl_ranges: VecDeque::with_capacity(cap),
            timestamps: VecDeque::with_capacity(cap),
            last_mid: None,
        }
    }

    /// Record a tick, deriving the log mid-price return
    pub fn add_tick(&mut self, tick: &Tick) {
        let mid = tick.mid_price();
        if let Some(prev) = self.last_mid {
            if prev > 0.0 && mid > 0.0 {
                if self.returns.len() == self.window_size {
                    self.returns.pop_front();
                }
                self.returns.push_back((mid / prev).ln());
            }
        }
        self.last_mid = Some(mid);

        let bid = tick.bid().as_f64();
        let ask = tick.ask().as_f64();
        if bid > 0.0 && ask > 0.0 {
            if self.hl_ranges.len() == self.window_size {
                self.hl_ranges.pop_front();
            }
            let r = (ask / bid).ln();
            self.hl_ranges.push_back(r * r);
        }

        if self.timestamps.len() == self.window_size {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(tick.ts());
    }

    /// Number of returns currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// True when no return has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Sample standard deviation of the window's returns
    ///
    /// Optionally annualized using the observed tick cadence; absent below
    /// 2 samples, or when annualization is requested but the cadence is
    /// unknown.
    #[must_use]
    pub fn realized_volatility(&self, annualize: bool) -> Option<f64> {
        let vol = sample_std(self.returns.iter().copied())?;
        if !annualize {
            return Some(vol);
        }
        let periods = self.periods_per_year()?;
        Some(vol * periods.sqrt())
    }

    /// Recursive EWMA volatility seeded by the first squared return
    ///
    /// `lambda_param` must lie in (0, 1); absent below 2 samples or for an
    /// out-of-range decay.
    #[must_use]
    pub fn ewma_volatility(&self, lambda_param: f64) -> Option<f64> {
        if self.returns.len() < 2 || !(0.0..1.0).contains(&lambda_param) || lambda_param == 0.0 {
            return None;
        }
        let mut iter = self.returns.iter();
        let first = iter.next()?;
        let mut var = first * first;
        for r in iter {
            var = lambda_param * var + (1.0 - lambda_param) * r * r;
        }
        Some(var.sqrt())
    }

    /// Parkinson range volatility from per-tick bid/ask spans
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn parkinson_volatility(&self) -> Option<f64> {
        if self.hl_ranges.len() < 2 {
            return None;
        }
        let mean = self.hl_ranges.iter().sum::<f64>() / self.hl_ranges.len() as f64;
        Some((mean / (4.0 * 2.0f64.ln())).sqrt())
    }

    /// True when the short-horizon volatility exceeds `threshold` times the
    /// full-window estimate
    ///
    /// The short horizon is the last 10% of the window (at least 2 samples).
    #[must_use]
    pub fn detect_volatility_clustering(&self, threshold: f64) -> bool {
        let n = self.returns.len();
        if n < MIN_REGIME_SAMPLES {
            return false;
        }
        let short_len = (n / 10).max(2);
        let short = sample_std(self.returns.iter().skip(n - short_len).copied());
        let long = sample_std(self.returns.iter().copied());
        match (short, long) {
            (Some(s), Some(l)) if l > 0.0 => s > threshold * l,
            _ => false,
        }
    }

    /// Classify the current EWMA volatility against percentile bands built
    /// from the window's own rolling sub-window volatilities
    #[must_use]
    pub fn volatility_regime(&self) -> Option<VolatilityRegime> {
        if self.returns.len() < MIN_REGIME_SAMPLES {
            return None;
        }
        let rolling = self.rolling_volatilities();
        if rolling.len() < 2 {
            return None;
        }
        let mut sorted = rolling;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let low_band = percentile(&sorted, LOW_BAND_PCT);
        let high_band = percentile(&sorted, HIGH_BAND_PCT);

        let current = self.ewma_volatility(REGIME_EWMA_LAMBDA)?;
        if current < low_band {
            Some(VolatilityRegime::Low)
        } else if current > high_band {
            Some(VolatilityRegime::High)
        } else {
            Some(VolatilityRegime::Normal)
        }
    }

    fn rolling_volatilities(&self) -> Vec<f64> {
        let returns: Vec<f64> = self.returns.iter().copied().collect();
        if returns.len() < SUB_WINDOW {
            return Vec::new();
        }
        returns
            .windows(SUB_WINDOW)
            .filter_map(|w| sample_std(w.iter().copied()))
            .collect()
    }

    /// Periods per year implied by the observed tick cadence
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn periods_per_year(&self) -> Option<f64> {
        let n = self.timestamps.len();
        if n < 2 {
            return None;
        }
        let first = *self.timestamps.front()?;
        let last = *self.timestamps.back()?;
        let span = last.secs_since(first);
        if span <= 0.0 {
            return None;
        }
        let avg_dt = span / (n - 1) as f64;
        Some(SECONDS_PER_YEAR / avg_dt)
    }
}

#[allow(clippy::cast_precision_loss)]
fn sample_std(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    Some(var.sqrt())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
