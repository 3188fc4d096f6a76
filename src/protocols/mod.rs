pub mod curvance;
pub mod euler;
pub mod morpho;
pub mod neverland;

pub use curvance::CurvanceAdapter;
pub use euler::EulerAdapter;
pub use morpho::MorphoAdapter;
pub use neverland::NeverlandAdapter;

use async_trait::async_trait;
use ethers::types::H160;

use crate::blockchain::ChainClient;
use crate::types::RawReading;

/// Capability contract implemented once per lending protocol.
///
/// Adapters translate a wallet address into zero or more raw readings via
/// read-only chain calls and/or indexer HTTP calls. They never write state
/// and never let failures escape: expected "no data" conditions and
/// transient source errors both come back as an empty (or partial) list,
/// logged internally, so one broken protocol cannot block the others.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Stable lowercase identifier, used as registry key and cache key part.
    fn protocol_id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// The client used for this protocol's chain reads, when it has one.
    /// Indexer-only adapters return None; the normalizer then relies on
    /// already-scaled balances.
    fn chain_client(&self) -> Option<&ChainClient>;

    async fn discover_positions(&self, wallet: H160) -> Vec<RawReading>;
}
