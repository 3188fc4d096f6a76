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
use crate::config::EulerConfig;
use crate::constants::WAD;
use crate::types::{Asset, RawBalance, RawReading};
use crate::utils::{short_address, u256_to_f64};

const LENS_ABI: &str = include_str!("../../abi/EulerVaultLens.json");

/// (healthFactor, collateralValue, debtValue), all WAD-scaled.
type VaultPosition = (U256, U256, U256);

/// Vault-per-market protocol read through the vault lens: enumerate the
/// vaults an account has touched, then query each vault's position
/// separately. Every vault is its own risk bucket.
pub struct EulerAdapter {
    chain: ChainClient,
    lens: Contract<Provider<Http>>,
    app_url: String,
}

impl EulerAdapter {
    pub fn new(cfg: &EulerConfig) -> Result<Self> {
        let chain = ChainClient::connect(&cfg.rpc_url, cfg.chain_id)?;
        let lens_address: H160 = cfg.vault_lens_address.parse()?;
        let lens = chain.contract(lens_address, LENS_ABI)?;
        Ok(Self {
            chain,
            lens,
            app_url: cfg.app_url.clone(),
        })
    }

    async fn fetch(&self, wallet: H160) -> Result<Vec<RawReading>> {
        let vaults: Vec<H160> = self
            .lens
            .method::<_, Vec<H160>>("getAccountVaults", wallet)?
            .call()
            .await?;
        if vaults.is_empty() {
            debug!("Euler: no vaults for {:#x}", wallet);
            return Ok(Vec::new());
        }

        let mut readings = Vec::new();
        for vault in vaults {
            let position: VaultPosition = match self
                .lens
                .method::<_, VaultPosition>("getVaultPosition", (wallet, vault))?
                .call()
                .await
            {
                Ok(position) => position,
                Err(e) => {
                    warn!("Euler vault {:#x} position query failed: {}", vault, e);
                    continue;
                }
            };
            if let Some(reading) = vault_position_to_reading(vault, position, &self.app_url) {
                readings.push(reading);
            }
        }
        Ok(readings)
    }
}

fn vault_position_to_reading(
    vault: H160,
    (health_raw, collateral_raw, debt_raw): VaultPosition,
    app_url: &str,
) -> Option<RawReading> {
    if debt_raw.is_zero() {
        debug!("Euler: vault {:#x} is supply-only, skipped", vault);
        return None;
    }
    let collateral_usd = u256_to_f64(collateral_raw) / WAD;
    let debt_usd = u256_to_f64(debt_raw) / WAD;
    Some(RawReading {
        market_id: format!("{:#x}", vault),
        market_name: format!("Euler Vault ({})", short_address(vault)),
        health_factor: Some(u256_to_f64(health_raw) / WAD),
        collateral: RawBalance::Scaled(Asset::new("USD", collateral_usd, collateral_usd, 18)),
        debt: RawBalance::Scaled(Asset::new("USD", debt_usd, debt_usd, 18)),
        liquidation_price: None,
        liquidation_drop_pct: None,
        app_url: Some(app_url.to_string()),
    })
}

#[async_trait]
impl ProtocolAdapter for EulerAdapter {
    fn protocol_id(&self) -> &'static str {
        "euler"
    }

    fn display_name(&self) -> &'static str {
        "Euler"
    }

    fn chain_client(&self) -> Option<&ChainClient> {
        Some(&self.chain)
    }

    async fn discover_positions(&self, wallet: H160) -> Vec<RawReading> {
        match self.fetch(wallet).await {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Euler vault enumeration failed for {:#x}: {}", wallet, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(value: f64) -> U256 {
        U256::from((value * 1e18) as u128)
    }

    #[test]
    fn test_vault_position_scales_wad_values() {
        let vault = H160::from_low_u64_be(0x1234);
        let reading =
            vault_position_to_reading(vault, (wad(1.75), wad(5000.0), wad(2000.0)), "https://app")
                .unwrap();

        assert_eq!(reading.market_id, format!("{:#x}", vault));
        assert!(reading.market_name.starts_with("Euler Vault (0x"));
        assert!((reading.health_factor.unwrap() - 1.75).abs() < 1e-9);
        match &reading.collateral {
            RawBalance::Scaled(asset) => assert!((asset.usd_value - 5000.0).abs() < 1e-6),
            _ => panic!("expected scaled collateral"),
        }
    }

    #[test]
    fn test_supply_only_vault_is_skipped() {
        let vault = H160::from_low_u64_be(0x1234);
        let reading =
            vault_position_to_reading(vault, (wad(0.0), wad(5000.0), U256::zero()), "https://app");
        assert!(reading.is_none());
    }
}
