use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub protocols: ProtocolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,
    #[serde(default = "default_probe_cap")]
    pub manager_probe_cap: usize,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    pub neverland: NeverlandConfig,
    pub morpho: MorphoConfig,
    pub curvance: CurvanceConfig,
    pub euler: EulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeverlandConfig {
    pub enabled: bool,
    pub rpc_url: String,
    pub chain_id: u64,
    pub pool_address: String,
    pub app_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorphoConfig {
    pub enabled: bool,
    pub graphql_url: String,
    pub chain_id: u64,
    pub app_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvanceConfig {
    pub enabled: bool,
    pub rpc_url: String,
    pub chain_id: u64,
    pub protocol_reader_address: String,
    pub central_registry_address: String,
    /// Fallback manager list when the central registry is unreachable.
    #[serde(default)]
    pub fallback_market_managers: Vec<String>,
    pub app_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EulerConfig {
    pub enabled: bool,
    pub rpc_url: String,
    pub chain_id: u64,
    pub vault_lens_address: String,
    pub app_url: String,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_adapter_timeout() -> u64 {
    DEFAULT_ADAPTER_TIMEOUT_SECS
}

fn default_probe_cap() -> usize {
    DEFAULT_MANAGER_PROBE_CAP
}

fn default_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.cache_ttl_secs == 0 {
            return Err(anyhow!("discovery.cache_ttl_secs must be positive"));
        }
        if self.discovery.adapter_timeout_secs == 0 {
            return Err(anyhow!("discovery.adapter_timeout_secs must be positive"));
        }
        if self.discovery.manager_probe_cap == 0 {
            return Err(anyhow!("discovery.manager_probe_cap must be positive"));
        }
        if self.discovery.default_threshold <= 0.0 {
            return Err(anyhow!("discovery.default_threshold must be positive"));
        }
        let p = &self.protocols;
        if !(p.neverland.enabled || p.morpho.enabled || p.curvance.enabled || p.euler.enabled) {
            return Err(anyhow!("no protocols enabled"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let rpc_url =
            std::env::var("MONAD_NODE_URL").unwrap_or_else(|_| DEFAULT_MONAD_RPC_URL.to_string());
        Self {
            discovery: DiscoveryConfig {
                cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
                adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
                manager_probe_cap: DEFAULT_MANAGER_PROBE_CAP,
                default_threshold: DEFAULT_ALERT_THRESHOLD,
            },
            protocols: ProtocolsConfig {
                neverland: NeverlandConfig {
                    enabled: true,
                    rpc_url: rpc_url.clone(),
                    chain_id: MONAD_CHAIN_ID,
                    pool_address: NEVERLAND_POOL.to_string(),
                    app_url: NEVERLAND_APP_URL.to_string(),
                },
                morpho: MorphoConfig {
                    enabled: true,
                    graphql_url: MORPHO_GRAPHQL_URL.to_string(),
                    chain_id: MONAD_CHAIN_ID,
                    app_url: MORPHO_APP_URL.to_string(),
                },
                curvance: CurvanceConfig {
                    enabled: true,
                    rpc_url: rpc_url.clone(),
                    chain_id: MONAD_CHAIN_ID,
                    protocol_reader_address: CURVANCE_PROTOCOL_READER.to_string(),
                    central_registry_address: CURVANCE_CENTRAL_REGISTRY.to_string(),
                    fallback_market_managers: KNOWN_CURVANCE_MARKET_MANAGERS
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    app_url: CURVANCE_APP_URL.to_string(),
                },
                // Off by default until the Monad deployment exposes a stable
                // vault index.
                euler: EulerConfig {
                    enabled: false,
                    rpc_url,
                    chain_id: MONAD_CHAIN_ID,
                    vault_lens_address: EULER_VAULT_LENS.to_string(),
                    app_url: EULER_APP_URL.to_string(),
                },
            },
        }
    }
}
