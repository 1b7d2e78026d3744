//! Anomaly detection ensemble for FX market surveillance
//!
//! Statistical detectors (z-score, half-space trees, isolation forest) and
//! manipulation heuristics (quote stuffing, wash trading, spoofing) behind
//! a uniform observe/score contract, fused per event by
//! [`MultiFeatureAnomalyDetector`].

pub mod ensemble;
pub mod features;
pub mod half_space_trees;
pub mod isolation_forest;
pub mod quote_stuffing;
pub mod spoofing;
pub mod wash_trading;
pub mod zscore;

pub use ensemble::{
    Detector, DetectorVerdict, EnsembleDecision, EnsembleParams, MultiFeatureAnomalyDetector, fuse,
};
pub use features::{FeatureVector, ScalarFeature};
pub use half_space_trees::HalfSpaceTreeDetector;
pub use isolation_forest::IsolationForestDetector;
pub use quote_stuffing::{QuoteStuffingDetector, QuoteStuffingReport};
pub use spoofing::SpoofingDetector;
pub use wash_trading::WashTradingDetector;
pub use zscore::ZScoreDetector;
