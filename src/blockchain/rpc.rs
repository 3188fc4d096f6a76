use std::sync::Arc;

use anyhow::Result;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::{Http, Provider},
    types::H160,
};
use tracing::debug;

/// Read-only JSON-RPC client for one protocol's chain endpoint.
///
/// Each protocol config carries its own RPC URL and chain id, so adapters
/// hold their own client instance. Never signs or sends transactions.
#[derive(Debug, Clone)]
pub struct ChainClient {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
}

impl ChainClient {
    /// Connection is lazy: no network traffic happens until the first call.
    pub fn connect(rpc_url: &str, chain_id: u64) -> Result<Self> {
        debug!("🔌 Chain client for chain {} via {}", chain_id, rpc_url);
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }

    /// Build a typed contract handle from an embedded ABI JSON fragment.
    pub fn contract(&self, address: H160, abi_json: &str) -> Result<Contract<Provider<Http>>> {
        let abi: Abi = serde_json::from_str(abi_json)?;
        Ok(Contract::new(address, abi, Arc::clone(&self.provider)))
    }
}
