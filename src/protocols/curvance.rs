use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    contract::Contract,
    providers::{Http, Provider},
    types::{H160, U256},
};
use tracing::{debug, warn};

use super::ProtocolAdapter;
use crate::blockchain::ChainClient;
use crate::config::CurvanceConfig;
use crate::constants::{HEALTH_FACTOR_SENTINEL, WAD};
use crate::types::{Asset, RawBalance, RawReading, TokenAmount};
use crate::utils::u256_to_f64;

const READER_ABI: &str = include_str!("../../abi/CurvanceProtocolReader.json");
const REGISTRY_ABI: &str = include_str!("../../abi/CurvanceCentralRegistry.json");

/// Raw user position from `getAllDynamicState`:
/// (cToken, collateral, debt, health, tokenBalance). Tagged only with the
/// collateral token, not the owning market manager.
type UserPositionTuple = (H160, U256, U256, U256, U256);

/// Full `getAllDynamicState` return: (marketData, (veLocks, positions)).
type DynamicState = (
    Vec<(H160, U256)>,
    (Vec<(U256, U256)>, Vec<UserPositionTuple>),
);

/// Finds the market manager that owns an account's collateral-token
/// position. The on-chain data does not name the owner, so discovery is a
/// bounded trial-and-error search; the seam exists so a proper indexer can
/// replace it later without touching the rest of the adapter.
#[async_trait]
pub(crate) trait ManagerProber: Send + Sync {
    /// Returns the owning manager and the account's aggregate health within
    /// it, or None when every candidate was exhausted.
    async fn probe(&self, account: H160, c_token: H160, candidates: &[H160]) -> Option<(H160, f64)>;
}

/// Probes via `getPositionHealth` against each candidate manager in turn,
/// stopping at the first plausible non-sentinel result.
struct ReaderProber {
    reader: Contract<Provider<Http>>,
    cap: usize,
}

#[async_trait]
impl ManagerProber for ReaderProber {
    async fn probe(&self, account: H160, c_token: H160, candidates: &[H160]) -> Option<(H160, f64)> {
        for &mm in candidates.iter().take(self.cap) {
            // Zero amounts and flags mean "inspect the existing position"
            // rather than simulating a deposit or repayment.
            let call = match self.reader.method::<_, (U256, bool)>(
                "getPositionHealth",
                (
                    mm,
                    account,
                    c_token,
                    H160::zero(),
                    false,
                    U256::zero(),
                    false,
                    U256::zero(),
                    U256::zero(),
                ),
            ) {
                Ok(call) => call,
                Err(e) => {
                    debug!("getPositionHealth encode failed: {}", e);
                    return None;
                }
            };
            match call.call().await {
                Ok((health_raw, error_code_hit)) => {
                    if error_code_hit {
                        continue;
                    }
                    let health = u256_to_f64(health_raw) / WAD;
                    if health > 0.0 && health <= HEALTH_FACTOR_SENTINEL {
                        debug!(
                            "Curvance: cToken {:#x} owned by manager {:#x} (health {:.4})",
                            c_token, mm, health
                        );
                        return Some((mm, health));
                    }
                }
                Err(e) => {
                    debug!(
                        "getPositionHealth against manager {:#x} failed: {}",
                        mm, e
                    );
                }
            }
        }
        None
    }
}

/// One raw collateral-token position attributed to its market manager.
#[derive(Debug, Clone)]
struct ResolvedLeg {
    manager: H160,
    c_token: H160,
    collateral_raw: U256,
    debt_raw: U256,
    health: f64,
}

/// Pooled-market protocol where health is aggregated per account per market
/// manager. Raw positions arrive keyed by collateral token only; the adapter
/// attributes each to its manager (probing, see [`ManagerProber`]) and merges
/// all legs of one manager into a single reading, because the returned
/// health already covers the whole account within that manager. Emitting the
/// legs separately would report contradictory duplicates for one risk bucket.
pub struct CurvanceAdapter {
    chain: ChainClient,
    reader: Contract<Provider<Http>>,
    registry: Contract<Provider<Http>>,
    prober: Box<dyn ManagerProber>,
    fallback_managers: Vec<H160>,
    app_url: String,
    /// Positions dropped because probing exhausted all candidates. A visible
    /// coverage gap, not an error.
    unresolved: AtomicU64,
}

impl CurvanceAdapter {
    pub fn new(cfg: &CurvanceConfig, probe_cap: usize) -> Result<Self> {
        let chain = ChainClient::connect(&cfg.rpc_url, cfg.chain_id)?;
        let reader_address: H160 = cfg.protocol_reader_address.parse()?;
        let reader = chain.contract(reader_address, READER_ABI)?;
        let prober = Box::new(ReaderProber {
            reader: chain.contract(reader_address, READER_ABI)?,
            cap: probe_cap,
        });
        Self::build(cfg, chain, reader, prober)
    }

    #[cfg(test)]
    pub(crate) fn with_prober(cfg: &CurvanceConfig, prober: Box<dyn ManagerProber>) -> Result<Self> {
        let chain = ChainClient::connect(&cfg.rpc_url, cfg.chain_id)?;
        let reader_address: H160 = cfg.protocol_reader_address.parse()?;
        let reader = chain.contract(reader_address, READER_ABI)?;
        Self::build(cfg, chain, reader, prober)
    }

    fn build(
        cfg: &CurvanceConfig,
        chain: ChainClient,
        reader: Contract<Provider<Http>>,
        prober: Box<dyn ManagerProber>,
    ) -> Result<Self> {
        let registry_address: H160 = cfg.central_registry_address.parse()?;
        let registry = chain.contract(registry_address, REGISTRY_ABI)?;
        let fallback_managers = cfg
            .fallback_market_managers
            .iter()
            .map(|s| s.parse::<H160>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            chain,
            reader,
            registry,
            prober,
            fallback_managers,
            app_url: cfg.app_url.clone(),
            unresolved: AtomicU64::new(0),
        })
    }

    pub fn unresolved_positions(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }

    /// All registered market managers from the central registry, or the
    /// configured fallback list when the registry call fails.
    async fn market_managers(&self) -> Vec<H160> {
        let call = self
            .registry
            .method::<_, Vec<H160>>("marketManagers", ());
        match call {
            Ok(call) => match call.call().await {
                Ok(managers) if !managers.is_empty() => {
                    debug!("Curvance: {} managers from central registry", managers.len());
                    return managers;
                }
                Ok(_) => {}
                Err(e) => warn!("Curvance central registry query failed: {}", e),
            },
            Err(e) => warn!("Curvance central registry encode failed: {}", e),
        }
        self.fallback_managers.clone()
    }

    async fn fetch(&self, wallet: H160) -> Result<Vec<RawReading>> {
        let state: DynamicState = self
            .reader
            .method::<_, DynamicState>("getAllDynamicState", wallet)?
            .call()
            .await?;
        let positions = state.1 .1;
        if positions.is_empty() {
            debug!("Curvance: no raw positions for {:#x}", wallet);
            return Ok(Vec::new());
        }
        let managers = self.market_managers().await;
        Ok(self.resolve_and_group(wallet, positions, &managers).await)
    }

    /// Attribute each nonzero-debt raw position to its manager and merge per
    /// manager. Probing is sequential; it short-circuits on the first match.
    async fn resolve_and_group(
        &self,
        wallet: H160,
        positions: Vec<UserPositionTuple>,
        managers: &[H160],
    ) -> Vec<RawReading> {
        let mut legs = Vec::new();
        for (c_token, collateral_raw, debt_raw, _health, _balance) in positions {
            if debt_raw.is_zero() {
                debug!("Curvance: skipping supply-only position {:#x}", c_token);
                continue;
            }
            match self.prober.probe(wallet, c_token, managers).await {
                Some((manager, health)) => legs.push(ResolvedLeg {
                    manager,
                    c_token,
                    collateral_raw,
                    debt_raw,
                    health,
                }),
                None => {
                    self.unresolved.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Curvance: no manager matched cToken {:#x} for {:#x}; position dropped",
                        c_token, wallet
                    );
                }
            }
        }
        group_by_manager(legs, &self.app_url)
    }
}

/// Merge resolved legs into one reading per market manager: collateral legs
/// accumulate for per-token scaling downstream, debts sum, and the shared
/// aggregate health takes the worst value seen. First-seen manager order is
/// preserved.
fn group_by_manager(legs: Vec<ResolvedLeg>, app_url: &str) -> Vec<RawReading> {
    struct Group {
        manager: H160,
        collateral: Vec<TokenAmount>,
        debt_raw: U256,
        health: f64,
    }

    let mut groups: Vec<Group> = Vec::new();
    for leg in legs {
        let token = TokenAmount {
            token: leg.c_token,
            raw: leg.collateral_raw,
            fallback_symbol: "?".to_string(),
        };
        match groups.iter_mut().find(|g| g.manager == leg.manager) {
            Some(group) => {
                group.collateral.push(token);
                group.debt_raw += leg.debt_raw;
                group.health = group.health.min(leg.health);
            }
            None => groups.push(Group {
                manager: leg.manager,
                collateral: vec![token],
                debt_raw: leg.debt_raw,
                health: leg.health,
            }),
        }
    }

    groups
        .into_iter()
        .map(|group| {
            // The borrowable token is not identifiable from the reader
            // output; treat debt as WAD-scaled units with unknown symbol.
            let debt_amount = u256_to_f64(group.debt_raw) / WAD;
            RawReading {
                market_id: format!("{:#x}", group.manager),
                market_name: "Curvance Market".to_string(),
                health_factor: Some(group.health),
                collateral: RawBalance::Tokens(group.collateral),
                debt: RawBalance::Scaled(Asset::new("?", debt_amount, debt_amount, 18)),
                liquidation_price: None,
                liquidation_drop_pct: None,
                app_url: Some(app_url.to_string()),
            }
        })
        .collect()
}

#[async_trait]
impl ProtocolAdapter for CurvanceAdapter {
    fn protocol_id(&self) -> &'static str {
        "curvance"
    }

    fn display_name(&self) -> &'static str {
        "Curvance"
    }

    fn chain_client(&self) -> Option<&ChainClient> {
        Some(&self.chain)
    }

    async fn discover_positions(&self, wallet: H160) -> Vec<RawReading> {
        match self.fetch(wallet).await {
            Ok(readings) => {
                debug!("Curvance: {} merged reading(s) for {:#x}", readings.len(), wallet);
                readings
            }
            Err(e) => {
                warn!("Curvance state query failed for {:#x}: {}", wallet, e);
                Vec::new()
            }
        }
    }
}
