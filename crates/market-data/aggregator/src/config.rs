//! Aggregator configuration

use serde::{Deserialize, Serialize};
use surveillance::EnsembleParams;

/// Explicit configuration for one per-symbol processing unit
///
/// Passed by value into each unit at construction; there is no
/// process-wide mutable state. Defaults mirror the reference deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Ticks retained by the spread calculator
    pub spread_window: usize,

    /// Book levels analyzed per side
    pub depth_max_levels: usize,

    /// Returns retained by the volatility analyzer
    pub volatility_window: usize,

    /// Z-score window length
    pub zscore_window: usize,

    /// Z-score firing threshold (standard deviations)
    pub zscore_threshold: f64,

    /// Half-space tree count
    pub hst_n_trees: usize,

    /// Half-space tree height
    pub hst_height: usize,

    /// Half-space tree reference window
    pub hst_window_size: usize,

    /// Quote-stuffing sliding window in seconds
    pub quote_stuffing_window_seconds: u64,

    /// Quote updates per second above which stuffing fires
    pub quote_stuffing_threshold: f64,

    /// Wash-trading sliding window in seconds
    pub wash_trading_window_seconds: u64,

    /// Matched-volume ratio above which wash trading fires
    pub wash_trading_ratio_threshold: f64,

    /// Book levels monitored for spoofing
    pub spoofing_depth_threshold: usize,

    /// Size multiple over the trailing average that marks an order
    pub spoofing_size_multiplier: f64,

    /// EWMA decay for the volatility estimator
    pub ewma_lambda: f64,

    /// Volume per order-flow bucket
    pub flow_bucket_volume: f64,

    /// Closed order-flow buckets retained
    pub flow_max_buckets: usize,

    /// (price change, signed flow) pairs retained by Kyle's Lambda
    pub kyle_window: usize,

    /// Minimum pairs before Kyle's Lambda is reported
    pub kyle_min_observations: usize,

    /// Observations retained by the Amihud estimator
    pub amihud_window: usize,

    /// Isolation forest tree count
    pub iforest_n_estimators: usize,

    /// Isolation forest sub-sample size
    pub iforest_sample_size: usize,

    /// Observations between isolation forest retrains
    pub iforest_retrain_interval: usize,

    /// Isolation forest feature buffer length
    pub iforest_window: usize,

    /// Seed for the randomized detectors
    pub detector_seed: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            spread_window: 100,
            depth_max_levels: 10,
            volatility_window: 100,
            zscore_window: 100,
            zscore_threshold: 3.0,
            hst_n_trees: 10,
            hst_height: 8,
            hst_window_size: 250,
            quote_stuffing_window_seconds: 1,
            quote_stuffing_threshold: 100.0,
            wash_trading_window_seconds: 60,
            wash_trading_ratio_threshold: 0.5,
            spoofing_depth_threshold: 5,
            spoofing_size_multiplier: 3.0,
            ewma_lambda: 0.94,
            flow_bucket_volume: 1_000.0,
            flow_max_buckets: 50,
            kyle_window: 100,
            kyle_min_observations: 10,
            amihud_window: 100,
            iforest_n_estimators: 100,
            iforest_sample_size: 128,
            iforest_retrain_interval: 100,
            iforest_window: 1_000,
            detector_seed: 42,
        }
    }
}

impl MetricsConfig {
    /// Ensemble construction parameters carved out of this configuration
    #[must_use]
    pub fn ensemble_params(&self) -> EnsembleParams {
        EnsembleParams {
            quote_stuffing_window_seconds: self.quote_stuffing_window_seconds,
            quote_stuffing_threshold: self.quote_stuffing_threshold,
            wash_trading_window_seconds: self.wash_trading_window_seconds,
            wash_trading_ratio_threshold: self.wash_trading_ratio_threshold,
            spoofing_depth_threshold: self.spoofing_depth_threshold,
            spoofing_size_multiplier: self.spoofing_size_multiplier,
            zscore_window: self.zscore_window,
            zscore_threshold: self.zscore_threshold,
            hst_n_trees: self.hst_n_trees,
            hst_height: self.hst_height,
            hst_window_size: self.hst_window_size,
            iforest_n_estimators: self.iforest_n_estimators,
            iforest_sample_size: self.iforest_sample_size,
            iforest_retrain_interval: self.iforest_retrain_interval,
            iforest_window: self.iforest_window,
            detector_seed: self.detector_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_serde() -> Result<(), Box<dyn std::error::Error>> {
        let config = MetricsConfig::default();
        let json = serde_json::to_string(&config)?;
        let back: MetricsConfig = serde_json::from_str(&json)?;
        assert_eq!(back.spread_window, config.spread_window);
        assert_eq!(back.zscore_threshold, config.zscore_threshold);
        Ok(())
    }
}
