//! Detector table and per-event score fusion

use crate::features::{FeatureVector, ScalarFeature};
use crate::half_space_trees::HalfSpaceTreeDetector;
use crate::isolation_forest::IsolationForestDetector;
use crate::quote_stuffing::QuoteStuffingDetector;
use crate::spoofing::SpoofingDetector;
use crate::wash_trading::WashTradingDetector;
use crate::zscore::ZScoreDetector;
use common::{AnomalyKind, OrderBook, Tick, Trade};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One ensemble member behind the uniform observe/score contract
///
/// A closed set dispatched by match: the configured detectors are known at
/// compile time, no dynamic lookup.
#[derive(Debug)]
pub enum Detector {
    /// Excessive quoting rate
    QuoteStuffing(QuoteStuffingDetector),
    /// Circular self-trading
    WashTrading(WashTradingDetector),
    /// Oversized canceled resting orders
    Spoofing(SpoofingDetector),
    /// Rolling z-score on one scalar feature
    ZScore(ZScoreDetector),
    /// Half-space tree mass deficit
    HalfSpaceTrees(HalfSpaceTreeDetector),
    /// Isolation-forest path length
    IsolationForest(IsolationForestDetector),
}

impl Detector {
    /// Which anomaly this member attributes
    #[must_use]
    pub const fn kind(&self) -> AnomalyKind {
        match self {
            Self::QuoteStuffing(_) => AnomalyKind::QuoteStuffing,
            Self::WashTrading(_) => AnomalyKind::WashTrading,
            Self::Spoofing(_) => AnomalyKind::Spoofing,
            Self::ZScore(_) => AnomalyKind::ZScore,
            Self::HalfSpaceTrees(_) => AnomalyKind::HalfSpaceTrees,
            Self::IsolationForest(_) => AnomalyKind::IsolationForest,
        }
    }

    /// Score the current feature vector in [0, 1]
    pub fn observe(&mut self, features: &FeatureVector) -> f64 {
        match self {
            Self::QuoteStuffing(d) => d.observe(),
            Self::WashTrading(d) => d.observe(),
            Self::Spoofing(d) => d.observe(),
            Self::ZScore(d) => {
                let value = features.scalar(d.feature());
                d.observe(value)
            }
            Self::HalfSpaceTrees(d) => d.observe(features),
            Self::IsolationForest(d) => d.observe(features),
        }
    }

    /// True when the member's score is past its firing threshold
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        match self {
            Self::QuoteStuffing(d) => d.is_anomaly(score),
            Self::WashTrading(d) => d.is_anomaly(score),
            Self::Spoofing(d) => d.is_anomaly(score),
            Self::ZScore(d) => d.is_anomaly(score),
            Self::HalfSpaceTrees(d) => d.is_anomaly(score),
            Self::IsolationForest(d) => d.is_anomaly(score),
        }
    }
}

/// One member's contribution to an ensemble decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorVerdict {
    /// Attributed anomaly kind
    pub kind: AnomalyKind,
    /// Score in [0, 1]
    pub score: f64,
    /// Whether the member fired
    pub fired: bool,
}

/// Fused ensemble output for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDecision {
    /// True when at least one member fired
    pub is_anomaly: bool,
    /// Fired member with the highest score
    pub anomaly_type: Option<AnomalyKind>,
    /// The winning member's score
    pub anomaly_score: Option<f64>,
    /// Every member's verdict, in table order
    pub verdicts: Vec<DetectorVerdict>,
}

/// Select the winning verdict: maximum score among fired members
///
/// The scan uses strict comparison in table order, so an exact score tie
/// keeps the earlier entry; with manipulation heuristics listed first they
/// win ties against statistical detectors.
#[must_use]
pub fn fuse(verdicts: Vec<DetectorVerdict>) -> EnsembleDecision {
    let mut winner: Option<&DetectorVerdict> = None;
    for verdict in verdicts.iter().filter(|v| v.fired) {
        match winner {
            Some(current) if verdict.score > current.score => winner = Some(verdict),
            None => winner = Some(verdict),
            _ => {}
        }
    }
    let (anomaly_type, anomaly_score) = match winner {
        Some(v) => (Some(v.kind), Some(v.score)),
        None => (None, None),
    };
    EnsembleDecision {
        is_anomaly: anomaly_type.is_some(),
        anomaly_type,
        anomaly_score,
        verdicts,
    }
}

/// Runs every configured detector against each event's feature vector and
/// fuses their scores into one decision
#[derive(Debug)]
pub struct MultiFeatureAnomalyDetector {
    detectors: Vec<Detector>,
}

/// Construction parameters for the default detector table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleParams {
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
    /// Z-score window length
    pub zscore_window: usize,
    /// Z-score firing threshold
    pub zscore_threshold: f64,
    /// Half-space tree count
    pub hst_n_trees: usize,
    /// Half-space tree height
    pub hst_height: usize,
    /// Half-space tree reference window
    pub hst_window_size: usize,
    /// Isolation forest tree count
    pub iforest_n_estimators: usize,
    /// Isolation forest sub-sample size
    pub iforest_sample_size: usize,
    /// Observations between isolation forest retrains
    pub iforest_retrain_interval: usize,
    /// Isolation forest feature buffer length
    pub iforest_window: usize,
    /// Seed for the randomized members
    pub detector_seed: u64,
}

impl MultiFeatureAnomalyDetector {
    /// Build the default table: manipulation heuristics ahead of the
    /// statistical members (the tie-break priority order)
    #[must_use]
    pub fn new(params: &EnsembleParams) -> Self {
        let detectors = vec![
            Detector::QuoteStuffing(QuoteStuffingDetector::new(
                params.quote_stuffing_window_seconds,
                params.quote_stuffing_threshold,
            )),
            Detector::WashTrading(WashTradingDetector::new(
                params.wash_trading_window_seconds,
                params.wash_trading_ratio_threshold,
            )),
            Detector::Spoofing(SpoofingDetector::new(
                params.spoofing_depth_threshold,
                params.spoofing_size_multiplier,
            )),
            Detector::ZScore(ZScoreDetector::new(
                params.zscore_window,
                params.zscore_threshold,
                ScalarFeature::SpreadBps,
            )),
            Detector::HalfSpaceTrees(HalfSpaceTreeDetector::new(
                params.hst_n_trees,
                params.hst_height,
                params.hst_window_size,
                params.detector_seed,
            )),
            Detector::IsolationForest(IsolationForestDetector::new(
                params.iforest_n_estimators,
                params.iforest_sample_size,
                params.iforest_retrain_interval,
                params.iforest_window,
                params.detector_seed,
            )),
        ];
        Self { detectors }
    }

    /// Build from an explicit detector table (tests, custom deployments)
    #[must_use]
    pub fn with_detectors(detectors: Vec<Detector>) -> Self {
        Self { detectors }
    }

    /// Feed a tick into the members that watch raw quote arrivals
    pub fn on_tick(&mut self, tick: &Tick) {
        for detector in &mut self.detectors {
            if let Detector::QuoteStuffing(d) = detector {
                d.on_tick(tick.ts());
            }
        }
    }

    /// Feed a classified trade into the members that watch executions
    pub fn on_trade(&mut self, trade: &Trade) {
        for detector in &mut self.detectors {
            match detector {
                Detector::WashTrading(d) => d.on_trade(trade),
                Detector::Spoofing(d) => d.on_trade(trade),
                _ => {}
            }
        }
    }

    /// Feed a book snapshot into the members that watch resting orders
    pub fn on_orderbook(&mut self, book: &OrderBook) {
        for detector in &mut self.detectors {
            if let Detector::Spoofing(d) = detector {
                d.on_orderbook(book);
            }
        }
    }

    /// Score the event's feature vector through every member and fuse
    pub fn evaluate(&mut self, features: &FeatureVector) -> EnsembleDecision {
        let verdicts: Vec<DetectorVerdict> = self
            .detectors
            .iter_mut()
            .map(|detector| {
                let score = detector.observe(features);
                DetectorVerdict {
                    kind: detector.kind(),
                    score,
                    fired: detector.is_anomaly(score),
                }
            })
            .collect();
        let decision = fuse(verdicts);
        if decision.is_anomaly {
            warn!(
                anomaly_type = ?decision.anomaly_type,
                anomaly_score = decision.anomaly_score,
                "anomaly flagged by ensemble"
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(kind: AnomalyKind, score: f64, fired: bool) -> DetectorVerdict {
        DetectorVerdict { kind, score, fired }
    }

    #[test]
    fn test_no_fired_members_no_anomaly() {
        let decision = fuse(vec![
            verdict(AnomalyKind::QuoteStuffing, 0.4, false),
            verdict(AnomalyKind::ZScore, 0.3, false),
        ]);
        assert!(!decision.is_anomaly);
        assert!(decision.anomaly_type.is_none());
        assert!(decision.anomaly_score.is_none());
    }

    #[test]
    fn test_highest_fired_score_wins() {
        let decision = fuse(vec![
            verdict(AnomalyKind::QuoteStuffing, 0.6, true),
            verdict(AnomalyKind::ZScore, 0.9, true),
        ]);
        assert!(decision.is_anomaly);
        assert_eq!(decision.anomaly_type, Some(AnomalyKind::ZScore));
        assert_eq!(decision.anomaly_score, Some(0.9));
    }

    #[test]
    fn test_unfired_high_score_ignored() {
        let decision = fuse(vec![
            verdict(AnomalyKind::HalfSpaceTrees, 0.95, false),
            verdict(AnomalyKind::WashTrading, 0.6, true),
        ]);
        assert_eq!(decision.anomaly_type, Some(AnomalyKind::WashTrading));
        assert_eq!(decision.anomaly_score, Some(0.6));
    }

    #[test]
    fn test_exact_tie_prefers_manipulation_member() {
        // Table order lists manipulation heuristics first; a strict max
        // scan keeps the earlier entry on an exact tie
        let decision = fuse(vec![
            verdict(AnomalyKind::Spoofing, 0.8, true),
            verdict(AnomalyKind::IsolationForest, 0.8, true),
        ]);
        assert_eq!(decision.anomaly_type, Some(AnomalyKind::Spoofing));
    }

    #[test]
    fn test_verdicts_preserved_in_table_order() {
        let verdicts = vec![
            verdict(AnomalyKind::QuoteStuffing, 0.1, false),
            verdict(AnomalyKind::WashTrading, 0.2, false),
            verdict(AnomalyKind::Spoofing, 0.3, false),
        ];
        let decision = fuse(verdicts.clone());
        assert_eq!(decision.verdicts, verdicts);
    }

    fn test_params() -> EnsembleParams {
        EnsembleParams {
            quote_stuffing_window_seconds: 1,
            quote_stuffing_threshold: 100.0,
            wash_trading_window_seconds: 60,
            wash_trading_ratio_threshold: 0.5,
            spoofing_depth_threshold: 5,
            spoofing_size_multiplier: 3.0,
            zscore_window: 100,
            zscore_threshold: 3.0,
            hst_n_trees: 10,
            hst_height: 8,
            hst_window_size: 250,
            iforest_n_estimators: 50,
            iforest_sample_size: 64,
            iforest_retrain_interval: 100,
            iforest_window: 500,
            detector_seed: 42,
        }
    }

    #[test]
    fn test_default_table_order_is_priority_order() {
        let mut ensemble = MultiFeatureAnomalyDetector::new(&test_params());
        let decision = ensemble.evaluate(&FeatureVector::default());
        let kinds: Vec<AnomalyKind> = decision.verdicts.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::QuoteStuffing,
                AnomalyKind::WashTrading,
                AnomalyKind::Spoofing,
                AnomalyKind::ZScore,
                AnomalyKind::HalfSpaceTrees,
                AnomalyKind::IsolationForest,
            ]
        );
    }

    mod fuse_properties {
        use super::*;
        use proptest::prelude::*;

        const KINDS: [AnomalyKind; 6] = [
            AnomalyKind::QuoteStuffing,
            AnomalyKind::WashTrading,
            AnomalyKind::Spoofing,
            AnomalyKind::ZScore,
            AnomalyKind::HalfSpaceTrees,
            AnomalyKind::IsolationForest,
        ];

        proptest! {
            #[test]
            fn prop_winner_is_max_fired_score(
                scores in proptest::collection::vec(0.0f64..=1.0, 6),
                fired in proptest::collection::vec(proptest::bool::ANY, 6),
            ) {
                let verdicts: Vec<DetectorVerdict> = KINDS
                    .iter()
                    .zip(scores.iter().zip(fired.iter()))
                    .map(|(&kind, (&score, &fired))| DetectorVerdict { kind, score, fired })
                    .collect();
                let any_fired = verdicts.iter().any(|v| v.fired);
                let max_fired = verdicts
                    .iter()
                    .filter(|v| v.fired)
                    .map(|v| v.score)
                    .fold(f64::NEG_INFINITY, f64::max);

                let decision = fuse(verdicts);
                prop_assert_eq!(decision.is_anomaly, any_fired);
                if any_fired {
                    prop_assert_eq!(decision.anomaly_score.unwrap(), max_fired);
                } else {
                    prop_assert!(decision.anomaly_type.is_none());
                    prop_assert!(decision.anomaly_score.is_none());
                }
            }
        }
    }

    #[test]
    fn test_quiet_market_produces_no_anomaly() {
        let mut ensemble = MultiFeatureAnomalyDetector::new(&test_params());
        let features = FeatureVector {
            mid_price: 1.0851,
            spread: 0.0002,
            spread_bps: 1.84,
            bid_depth: 500.0,
            ask_depth: 500.0,
            total_depth: 1000.0,
            flow_imbalance: 0.0,
            volatility: 0.0001,
        };
        for _ in 0..50 {
            let decision = ensemble.evaluate(&features);
            assert!(!decision.is_anomaly);
        }
    }
}
