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
use crate::config::NeverlandConfig;
use crate::constants::{BASE_CURRENCY_UNIT, WAD};
use crate::types::{Asset, RawBalance, RawReading};
use crate::utils::u256_to_f64;

const POOL_ABI: &str = include_str!("../../abi/NeverlandPool.json");

/// Account data tuple returned by `getUserAccountData`:
/// (totalCollateralBase, totalDebtBase, availableBorrowsBase,
///  currentLiquidationThreshold, ltv, healthFactor).
type AccountData = (U256, U256, U256, U256, U256, U256);

/// Aave-fork protocol with one aggregate health figure per account.
///
/// A single `getUserAccountData` call returns everything; the health factor
/// sits at index 5, WAD-scaled, and comes back as max-uint when the account
/// has no active debt. Collateral and debt are base-currency (USD) values
/// with 8 decimals; the protocol exposes no per-token breakdown here.
pub struct NeverlandAdapter {
    chain: ChainClient,
    pool: Contract<Provider<Http>>,
    app_url: String,
}

impl NeverlandAdapter {
    pub fn new(cfg: &NeverlandConfig) -> Result<Self> {
        let chain = ChainClient::connect(&cfg.rpc_url, cfg.chain_id)?;
        let pool_address: H160 = cfg.pool_address.parse()?;
        let pool = chain.contract(pool_address, POOL_ABI)?;
        Ok(Self {
            chain,
            pool,
            app_url: cfg.app_url.clone(),
        })
    }

    async fn fetch(&self, wallet: H160) -> Result<Vec<RawReading>> {
        let data: AccountData = self
            .pool
            .method::<_, AccountData>("getUserAccountData", wallet)?
            .call()
            .await?;
        Ok(Self::account_data_to_readings(data, &self.app_url))
    }

    /// Whole-account reading from the raw tuple. Sentinel filtering and the
    /// zero-debt check belong to the normalizer; this only scales.
    fn account_data_to_readings(data: AccountData, app_url: &str) -> Vec<RawReading> {
        let (total_collateral_base, total_debt_base, _, _, _, health_factor_raw) = data;
        let collateral_usd = u256_to_f64(total_collateral_base) / BASE_CURRENCY_UNIT;
        let debt_usd = u256_to_f64(total_debt_base) / BASE_CURRENCY_UNIT;
        let health_factor = u256_to_f64(health_factor_raw) / WAD;

        vec![RawReading {
            market_id: "neverland".to_string(),
            market_name: "Neverland".to_string(),
            health_factor: Some(health_factor),
            // No per-token data; the base-currency value doubles as amount.
            collateral: RawBalance::Scaled(Asset::new("USD", collateral_usd, collateral_usd, 8)),
            debt: RawBalance::Scaled(Asset::new("USD", debt_usd, debt_usd, 8)),
            liquidation_price: None,
            liquidation_drop_pct: None,
            app_url: Some(app_url.to_string()),
        }]
    }
}

#[async_trait]
impl ProtocolAdapter for NeverlandAdapter {
    fn protocol_id(&self) -> &'static str {
        "neverland"
    }

    fn display_name(&self) -> &'static str {
        "Neverland"
    }

    fn chain_client(&self) -> Option<&ChainClient> {
        Some(&self.chain)
    }

    async fn discover_positions(&self, wallet: H160) -> Vec<RawReading> {
        match self.fetch(wallet).await {
            Ok(readings) => {
                debug!("Neverland: {} reading(s) for {:#x}", readings.len(), wallet);
                readings
            }
            Err(e) => {
                warn!("Neverland account data call failed for {:#x}: {}", wallet, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_data(collateral_base: u128, debt_base: u128, health_raw: U256) -> AccountData {
        (
            U256::from(collateral_base),
            U256::from(debt_base),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            health_raw,
        )
    }

    #[test]
    fn test_health_factor_wad_scaling() {
        // Raw 1.8e18 with WAD divisor -> 1.8
        let data = account_data(
            500_000_000_000u128, // $5,000.00 in 8 decimals
            100_000_000_000u128, // $1,000.00
            U256::from(1_800_000_000_000_000_000u128),
        );
        let readings = NeverlandAdapter::account_data_to_readings(data, "https://app");
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert!((r.health_factor.unwrap() - 1.8).abs() < 1e-9);
        match &r.collateral {
            RawBalance::Scaled(asset) => {
                assert!((asset.usd_value - 5000.0).abs() < 1e-9);
                assert_eq!(asset.symbol, "USD");
            }
            _ => panic!("expected scaled balance"),
        }
        match &r.debt {
            RawBalance::Scaled(asset) => assert!((asset.amount - 1000.0).abs() < 1e-9),
            _ => panic!("expected scaled balance"),
        }
    }

    #[test]
    fn test_max_uint_health_factor_stays_above_sentinel() {
        // Closed positions return max-uint; the reading carries a huge value
        // that the normalizer filters against the sentinel bound.
        let data = account_data(0, 0, U256::MAX);
        let readings = NeverlandAdapter::account_data_to_readings(data, "https://app");
        assert!(readings[0].health_factor.unwrap() > crate::constants::HEALTH_FACTOR_SENTINEL);
    }
}
