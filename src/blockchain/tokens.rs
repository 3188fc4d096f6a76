use dashmap::DashMap;
use ethers::types::H160;
use tracing::debug;

use super::ChainClient;

const ERC20_ABI: &str = include_str!("../../abi/ERC20.json");

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

/// Per-token symbol/decimals cache. Decimals never change for a deployed
/// token, so entries live for the lifetime of the engine. Owned by the
/// engine instance rather than a process-wide global so separate engines
/// (and tests) get a clean cache.
#[derive(Default)]
pub struct TokenMetadataCache {
    entries: DashMap<H160, TokenMetadata>,
}

impl TokenMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached metadata, querying the chain on a miss when a client is
    /// available. Fetch failures are a soft miss: the caller falls back to
    /// defaults and the token stays uncached for a later retry.
    pub async fn metadata(
        &self,
        client: Option<&ChainClient>,
        token: H160,
    ) -> Option<TokenMetadata> {
        if let Some(meta) = self.entries.get(&token) {
            return Some(meta.clone());
        }
        let client = client?;
        match self.fetch(client, token).await {
            Ok(meta) => {
                self.entries.insert(token, meta.clone());
                Some(meta)
            }
            Err(e) => {
                debug!("Could not fetch ERC-20 metadata for {:#x}: {}", token, e);
                None
            }
        }
    }

    async fn fetch(&self, client: &ChainClient, token: H160) -> anyhow::Result<TokenMetadata> {
        let contract = client.contract(token, ERC20_ABI)?;
        let symbol: String = contract.method::<_, String>("symbol", ())?.call().await?;
        let decimals: u8 = contract.method::<_, u8>("decimals", ())?.call().await?;
        Ok(TokenMetadata { symbol, decimals })
    }

    /// Seed an entry directly (tests, known-token bootstrapping).
    pub fn insert(&self, token: H160, meta: TokenMetadata) {
        self.entries.insert(token, meta);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
