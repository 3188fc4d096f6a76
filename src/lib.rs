pub mod alerts;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod normalizer;
pub mod protocols;
pub mod threshold;
pub mod types;
pub mod utils;

pub use alerts::{AlertEvaluator, AlertEvent};
pub use config::Config;
pub use discovery::{summarize, DiscoveryError, DiscoverySummary, PositionDiscoveryEngine};
pub use normalizer::PositionNormalizer;
pub use threshold::{ChatThresholds, ThresholdConfig, ThresholdResolver};
pub use types::{Asset, Position, RawBalance, RawReading, TokenAmount};
