//! Z-score anomaly detection over a sliding scalar window

use crate::features::ScalarFeature;
use std::collections::VecDeque;
use tracing::debug;

/// Score reaches 1.0 at this multiple of the firing threshold
const SCORE_CAP_MULTIPLIER: f64 = 2.0;

/// Rolling z-score detector with numerically stable incremental statistics
///
/// Mean and variance are maintained with Welford updates on admission and
/// the reverse update on eviction, so scoring is O(1) per observation.
#[derive(Debug)]
pub struct ZScoreDetector {
    window_size: usize,
    threshold: f64,
    feature: ScalarFeature,
    window: VecDeque<f64>,
    mean: f64,
    m2: f64,
    anomaly_count: u64,
}

impl ZScoreDetector {
    /// Create a detector over `window_size` samples of `feature`, firing
    /// when |z| exceeds `threshold`
    #[must_use]
    pub fn new(window_size: usize, threshold: f64, feature: ScalarFeature) -> Self {
        Self {
            window_size: window_size.max(2),
            threshold: threshold.max(f64::MIN_POSITIVE),
            feature,
            window: VecDeque::with_capacity(window_size.max(2)),
            mean: 0.0,
            m2: 0.0,
            anomaly_count: 0,
        }
    }

    /// Feature dimension this detector watches
    #[must_use]
    pub const fn feature(&self) -> ScalarFeature {
        self.feature
    }

    /// Z-score of `value` against the current window statistics
    ///
    /// Absent below 2 samples; neutral 0 at zero variance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn zscore(&self, value: f64) -> Option<f64> {
        let n = self.window.len();
        if n < 2 {
            return None;
        }
        let var = self.m2 / (n - 1) as f64;
        if var <= 0.0 {
            return Some(0.0);
        }
        Some((value - self.mean) / var.sqrt())
    }

    /// Score `value` against the window, then admit it
    ///
    /// Score is min(1, |z| / (cap multiplier * threshold)); exactly 0.5 at
    /// the firing boundary.
    pub fn observe(&mut self, value: f64) -> f64 {
        if !value.is_finite() {
            debug!("discarding non-finite z-score observation");
            return 0.0;
        }
        let score = match self.zscore(value) {
            Some(z) => {
                let scaled = z.abs() / (SCORE_CAP_MULTIPLIER * self.threshold);
                scaled.min(1.0)
            }
            None => 0.0,
        };
        self.push(value);
        if self.is_anomaly(score) {
            self.anomaly_count += 1;
        }
        score
    }

    /// True when the score is past the firing boundary
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > 0.5
    }

    /// Number of admitted samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True when no sample has been admitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Observations that fired so far
    #[must_use]
    pub const fn anomaly_count(&self) -> u64 {
        self.anomaly_count
    }

    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, value: f64) {
        if self.window.len() == self.window_size {
            if let Some(&old) = self.window.front() {
                self.remove(old);
            }
            self.window.pop_front();
        }
        self.window.push_back(value);
        let n = self.window.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);
    }

    /// Reverse Welford update; `value` must still be counted in the window
    #[allow(clippy::cast_precision_loss)]
    fn remove(&mut self, value: f64) {
        let n = self.window.len() as f64;
        if n <= 1.0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let reduced_mean = (n * self.mean - value) / (n - 1.0);
        self.m2 -= (value - reduced_mean) * (value - self.mean);
        self.m2 = self.m2.max(0.0);
        self.mean = reduced_mean;
    }
}
