//! Volume-bucketed order flow imbalance

use common::Side;
use std::collections::VecDeque;

/// Order flow imbalance accumulated into equal-volume buckets
///
/// Classified trade volume fills the current bucket; when the bucket
/// reaches `bucket_volume` its imbalance `(buy - sell) / (buy + sell)` is
/// pushed into a rolling window of closed buckets.
#[derive(Debug)]
pub struct FlowImbalanceCalculator {
    bucket_volume: f64,
    max_buckets: usize,
    closed: VecDeque<f64>,
    bucket_buy: f64,
    bucket_sell: f64,
}

impl FlowImbalanceCalculator {
    /// Create a calculator with the given bucket volume and window length
    #[must_use]
    pub fn new(bucket_volume: f64, max_buckets: usize) -> Self {
        Self {
            bucket_volume: bucket_volume.max(f64::MIN_POSITIVE),
            max_buckets: max_buckets.max(1),
            closed: VecDeque::with_capacity(max_buckets.max(1)),
            bucket_buy: 0.0,
            bucket_sell: 0.0,
        }
    }

    /// Accumulate a classified trade into the current bucket
    pub fn add_classified_trade(&mut self, size: f64, side: Side) {
        if size <= 0.0 {
            return;
        }
        match side {
            Side::Buy => self.bucket_buy += size,
            Side::Sell => self.bucket_sell += size,
        }
        if self.bucket_buy + self.bucket_sell >= self.bucket_volume {
            self.close_bucket();
        }
    }

    fn close_bucket(&mut self) {
        let total = self.bucket_buy + self.bucket_sell;
        if total <= 0.0 {
            return;
        }
        let imbalance = (self.bucket_buy - self.bucket_sell) / total;
        if self.closed.len() == self.max_buckets {
            self.closed.pop_front();
        }
        self.closed.push_back(imbalance);
        self.bucket_buy = 0.0;
        self.bucket_sell = 0.0;
    }

    /// Imbalance of the most recently closed bucket
    #[must_use]
    pub fn latest_bucket_imbalance(&self) -> Option<f64> {
        self.closed.back().copied()
    }

    /// Mean imbalance over the closed-bucket window
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rolling_imbalance(&self) -> Option<f64> {
        if self.closed.is_empty() {
            return None;
        }
        Some(self.closed.iter().sum::<f64>() / self.closed.len() as f64)
    }

    /// VPIN-style toxicity: mean absolute bucket imbalance
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn vpin(&self) -> Option<f64> {
        if self.closed.is_empty() {
            return None;
        }
        Some(self.closed.iter().map(|i| i.abs()).sum::<f64>() / self.closed.len() as f64)
    }

    /// Number of closed buckets in the window
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.closed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_no_buckets_absent() {
        let calc = FlowImbalanceCalculator::new(100.0, 10);
        assert!(calc.latest_bucket_imbalance().is_none());
        assert!(calc.rolling_imbalance().is_none());
        assert!(calc.vpin().is_none());
    }

    #[test]
    fn test_bucket_closes_at_volume() {
        let mut calc = FlowImbalanceCalculator::new(100.0, 10);
        calc.add_classified_trade(60.0, Side::Buy);
        assert_eq!(calc.bucket_count(), 0);
        calc.add_classified_trade(40.0, Side::Sell);
        assert_eq!(calc.bucket_count(), 1);
        // (60 - 40) / 100
        let imb = calc.latest_bucket_imbalance().expect("closed bucket");
        assert!((imb - 0.2).abs() < EPS);
    }

    #[test]
    fn test_all_buy_bucket_is_plus_one() {
        let mut calc = FlowImbalanceCalculator::new(50.0, 10);
        calc.add_classified_trade(50.0, Side::Buy);
        assert!((calc.latest_bucket_imbalance().expect("closed") - 1.0).abs() < EPS);
    }

    #[test]
    fn test_rolling_average_over_buckets() {
        let mut calc = FlowImbalanceCalculator::new(10.0, 10);
        calc.add_classified_trade(10.0, Side::Buy); // +1
        calc.add_classified_trade(10.0, Side::Sell); // -1
        let avg = calc.rolling_imbalance().expect("two buckets");
        assert!(avg.abs() < EPS);
        let vpin = calc.vpin().expect("two buckets");
        assert!((vpin - 1.0).abs() < EPS);
    }

    #[test]
    fn test_bucket_window_evicts() {
        let mut calc = FlowImbalanceCalculator::new(10.0, 2);
        calc.add_classified_trade(10.0, Side::Buy);
        calc.add_classified_trade(10.0, Side::Buy);
        calc.add_classified_trade(10.0, Side::Sell);
        assert_eq!(calc.bucket_count(), 2);
        // First +1 bucket evicted: remaining +1 and -1
        assert!(calc.rolling_imbalance().expect("window").abs() < EPS);
    }

    #[test]
    fn test_ignores_non_positive_size() {
        let mut calc = FlowImbalanceCalculator::new(10.0, 2);
        calc.add_classified_trade(0.0, Side::Buy);
        calc.add_classified_trade(-5.0, Side::Sell);
        assert_eq!(calc.bucket_count(), 0);
    }
}
