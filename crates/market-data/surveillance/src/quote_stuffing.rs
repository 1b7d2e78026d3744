//! Quote stuffing detection: excessive quoting rate in a sliding window

use common::Ts;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Detection result for the current window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteStuffingReport {
    /// True when the quote rate exceeds the threshold
    pub is_stuffing: bool,
    /// Quote updates per second over the window
    pub quote_rate: f64,
}

/// Counts tick arrivals inside a sliding time window
#[derive(Debug)]
pub struct QuoteStuffingDetector {
    window_seconds: f64,
    window_nanos: u64,
    /// Updates per second above which the detector fires
    threshold: f64,
    timestamps: VecDeque<Ts>,
    stuffing_events: u64,
}

impl QuoteStuffingDetector {
    /// Create a detector over `window_seconds` firing above `threshold`
    /// quote updates per second
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(window_seconds: u64, threshold: f64) -> Self {
        let window_seconds = window_seconds.max(1);
        Self {
            window_seconds: window_seconds as f64,
            window_nanos: window_seconds * 1_000_000_000,
            threshold: threshold.max(f64::MIN_POSITIVE),
            timestamps: VecDeque::new(),
            stuffing_events: 0,
        }
    }

    /// Record a quote update at `ts`, evicting entries older than the window
    pub fn on_tick(&mut self, ts: Ts) {
        self.timestamps.push_back(ts);
        let cutoff = ts.as_nanos().saturating_sub(self.window_nanos);
        while let Some(front) = self.timestamps.front() {
            if front.as_nanos() < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Quote updates per second over the current window
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn quote_rate(&self) -> f64 {
        self.timestamps.len() as f64 / self.window_seconds
    }

    /// Evaluate the current window
    pub fn detect(&mut self) -> QuoteStuffingReport {
        let quote_rate = self.quote_rate();
        let is_stuffing = quote_rate > self.threshold;
        if is_stuffing {
            self.stuffing_events += 1;
            warn!(quote_rate, threshold = self.threshold, "quote stuffing detected");
        }
        QuoteStuffingReport {
            is_stuffing,
            quote_rate,
        }
    }

    /// Score in [0, 1]: 0.5 exactly at the firing boundary
    #[must_use]
    pub fn observe(&self) -> f64 {
        (self.quote_rate() / (2.0 * self.threshold)).min(1.0)
    }

    /// True when the score is past the firing boundary
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > 0.5
    }

    /// Windows that fired so far
    #[must_use]
    pub const fn stuffing_events(&self) -> u64 {
        self.stuffing_events
    }
}
