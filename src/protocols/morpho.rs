use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::H160;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::ProtocolAdapter;
use crate::blockchain::ChainClient;
use crate::config::MorphoConfig;
use crate::types::{Asset, RawBalance, RawReading};

const USER_POSITIONS_QUERY: &str = r#"
query GetUserPositions($address: String!, $chainId: Int!) {
    userByAddress(chainId: $chainId, address: $address) {
        marketPositions {
            market {
                uniqueKey
                loanAsset { symbol decimals }
                collateralAsset { symbol decimals }
            }
            healthFactor
            borrowAssets
            borrowAssetsUsd
            supplyAssetsUsd
            state { collateral }
        }
    }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<GraphData>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    #[serde(rename = "userByAddress")]
    user_by_address: Option<GraphUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    #[serde(default)]
    market_positions: Vec<GraphMarketPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMarketPosition {
    market: GraphMarket,
    health_factor: Option<f64>,
    /// Raw loan-token units as a decimal string.
    borrow_assets: Option<String>,
    borrow_assets_usd: Option<f64>,
    supply_assets_usd: Option<f64>,
    state: Option<GraphPositionState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMarket {
    unique_key: String,
    loan_asset: Option<GraphAsset>,
    collateral_asset: Option<GraphAsset>,
}

#[derive(Debug, Deserialize)]
struct GraphAsset {
    symbol: String,
    decimals: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct GraphPositionState {
    /// Raw collateral-token units as a decimal string.
    collateral: Option<String>,
}

/// Isolated-market protocol backed by the Morpho GraphQL indexer.
///
/// The indexer reports a ready-made health factor and USD figures per
/// market, so no chain calls or decimal lookups are needed here; the adapter
/// only shapes readings and leaves validity filtering to the normalizer.
/// Alerting is best-effort: an unreachable indexer degrades to no readings.
pub struct MorphoAdapter {
    http: Client,
    graphql_url: String,
    chain_id: u64,
    app_url: String,
}

impl MorphoAdapter {
    pub fn new(cfg: &MorphoConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            graphql_url: cfg.graphql_url.clone(),
            chain_id: cfg.chain_id,
            app_url: cfg.app_url.clone(),
        })
    }

    async fn fetch(&self, wallet: H160) -> Result<Vec<RawReading>> {
        let body = serde_json::json!({
            "query": USER_POSITIONS_QUERY,
            "variables": {
                "address": format!("{:#x}", wallet),
                "chainId": self.chain_id,
            }
        });

        let response = self
            .http
            .post(&self.graphql_url)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("indexer returned HTTP {}", response.status()));
        }

        let parsed: GraphResponse = response.json().await?;
        for error in &parsed.errors {
            warn!("Morpho GraphQL error: {}", error.message);
        }

        let user = match parsed.data.and_then(|d| d.user_by_address) {
            Some(user) => user,
            None => {
                debug!("Morpho: no indexed user for {:#x}", wallet);
                return Ok(Vec::new());
            }
        };

        Ok(user
            .market_positions
            .into_iter()
            .map(|pos| self.position_to_reading(pos))
            .collect())
    }

    fn position_to_reading(&self, pos: GraphMarketPosition) -> RawReading {
        let loan_symbol = asset_symbol(&pos.market.loan_asset);
        let loan_decimals = asset_decimals(&pos.market.loan_asset);
        let coll_symbol = asset_symbol(&pos.market.collateral_asset);
        let coll_decimals = asset_decimals(&pos.market.collateral_asset);

        let borrow_amount = scale_raw_string(pos.borrow_assets.as_deref(), loan_decimals);
        let borrow_usd = pos.borrow_assets_usd.unwrap_or(borrow_amount);
        let collateral_amount = scale_raw_string(
            pos.state.as_ref().and_then(|s| s.collateral.as_deref()),
            coll_decimals,
        );
        let collateral_usd = pos.supply_assets_usd.unwrap_or(collateral_amount);

        RawReading {
            market_id: pos.market.unique_key.to_lowercase(),
            market_name: format!("{}-{}", coll_symbol, loan_symbol).to_lowercase(),
            health_factor: pos.health_factor,
            collateral: RawBalance::Scaled(Asset::new(
                coll_symbol,
                collateral_amount,
                collateral_usd,
                coll_decimals,
            )),
            debt: RawBalance::Scaled(Asset::new(
                loan_symbol,
                borrow_amount,
                borrow_usd,
                loan_decimals,
            )),
            liquidation_price: None,
            liquidation_drop_pct: None,
            app_url: Some(self.app_url.clone()),
        }
    }
}

fn asset_symbol(asset: &Option<GraphAsset>) -> String {
    asset
        .as_ref()
        .map(|a| a.symbol.clone())
        .unwrap_or_else(|| "?".to_string())
}

fn asset_decimals(asset: &Option<GraphAsset>) -> u8 {
    asset.as_ref().and_then(|a| a.decimals).unwrap_or(18)
}

fn scale_raw_string(raw: Option<&str>, decimals: u8) -> f64 {
    raw.and_then(|s| s.parse::<f64>().ok())
        .map(|v| v / 10f64.powi(decimals as i32))
        .unwrap_or(0.0)
}

#[async_trait]
impl ProtocolAdapter for MorphoAdapter {
    fn protocol_id(&self) -> &'static str {
        "morpho"
    }

    fn display_name(&self) -> &'static str {
        "Morpho"
    }

    fn chain_client(&self) -> Option<&ChainClient> {
        None
    }

    async fn discover_positions(&self, wallet: H160) -> Vec<RawReading> {
        match self.fetch(wallet).await {
            Ok(readings) => {
                debug!("Morpho: {} market reading(s) for {:#x}", readings.len(), wallet);
                readings
            }
            Err(e) => {
                warn!("Morpho indexer query failed for {:#x}: {}", wallet, e);
                Vec::new()
            }
        }
    }
}
