//! Streaming market-microstructure calculators
//!
//! Each calculator owns a bounded rolling window for one currency pair and
//! exposes `Option`-valued metrics that stay absent until the window has
//! warmed up. Nothing here allocates per event beyond window maintenance,
//! and nothing blocks.

pub mod classifier;
pub mod depth;
pub mod flow;
pub mod impact;
pub mod spread;
pub mod volatility;

pub use classifier::LeeReadyClassifier;
pub use depth::{DepthAnalyzer, DepthSnapshot, PriceImpact};
pub use flow::FlowImbalanceCalculator;
pub use impact::{AmihudIlliquidity, KyleLambda};
pub use spread::SpreadCalculator;
pub use volatility::{VolatilityAnalyzer, VolatilityRegime};
