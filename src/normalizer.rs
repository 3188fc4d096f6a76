use std::sync::Arc;

use tracing::debug;

use crate::blockchain::{ChainClient, TokenMetadataCache};
use crate::constants::HEALTH_FACTOR_SENTINEL;
use crate::types::{Asset, Position, RawBalance, RawReading};
use crate::utils::scale_units;

/// Turns protocol-specific readings into canonical [`Position`]s.
///
/// Validity gate: a reading survives only if its health factor is present,
/// strictly positive and at or below the sentinel bound, and it carries
/// nonzero debt. Supply-only accounts and "no position" sentinel returns are
/// silently dropped here so every downstream consumer sees one uniform rule.
pub struct PositionNormalizer {
    tokens: Arc<TokenMetadataCache>,
}

impl PositionNormalizer {
    pub fn new(tokens: Arc<TokenMetadataCache>) -> Self {
        Self { tokens }
    }

    pub async fn normalize(
        &self,
        protocol_id: &str,
        protocol_name: &str,
        client: Option<&ChainClient>,
        reading: RawReading,
    ) -> Option<Position> {
        let health_factor = match reading.health_factor {
            Some(hf) if hf > 0.0 && hf <= HEALTH_FACTOR_SENTINEL => hf,
            Some(hf) => {
                debug!(
                    "{}: dropping {} (health factor {} outside (0, {}])",
                    protocol_id, reading.market_id, hf, HEALTH_FACTOR_SENTINEL
                );
                return None;
            }
            None => {
                debug!("{}: dropping {} (no health factor)", protocol_id, reading.market_id);
                return None;
            }
        };

        let debt = self.resolve_balance(client, reading.debt).await;
        if debt.amount <= 0.0 {
            debug!("{}: dropping {} (no outstanding debt)", protocol_id, reading.market_id);
            return None;
        }
        let collateral = self.resolve_balance(client, reading.collateral).await;

        let liquidation_drop_pct = reading
            .liquidation_drop_pct
            .or_else(|| drop_to_liquidation_pct(health_factor));

        Some(Position {
            protocol_id: protocol_id.to_string(),
            protocol_name: protocol_name.to_string(),
            market_id: reading.market_id,
            market_name: reading.market_name,
            health_factor,
            collateral,
            debt,
            liquidation_price: reading.liquidation_price,
            liquidation_drop_pct,
            app_url: reading.app_url,
        })
    }

    /// Scale a pre-normalization balance to a display asset. Raw token legs
    /// are scaled per-token using cached ERC-20 metadata and summed; on a
    /// metadata miss the leg keeps its fallback symbol and assumes 18
    /// decimals. Without price data the USD value mirrors the amount.
    async fn resolve_balance(&self, client: Option<&ChainClient>, balance: RawBalance) -> Asset {
        match balance {
            RawBalance::Scaled(asset) => asset,
            RawBalance::Tokens(legs) => {
                let mut total = 0.0;
                let mut symbols: Vec<String> = Vec::new();
                for leg in &legs {
                    let (symbol, decimals) = match self.tokens.metadata(client, leg.token).await {
                        Some(meta) => (meta.symbol, meta.decimals),
                        None => (leg.fallback_symbol.clone(), 18),
                    };
                    total += scale_units(leg.raw, decimals);
                    if !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }
                let symbol = if symbols.is_empty() {
                    "?".to_string()
                } else {
                    symbols.join("+")
                };
                Asset::new(symbol, total, total, 18)
            }
        }
    }
}

/// Price drop that would push the position to liquidation, assuming debt
/// stays flat while collateral value falls: 1 - 1/hf. Negative below the
/// liquidation line (the position is already underwater by that margin).
fn drop_to_liquidation_pct(health_factor: f64) -> Option<f64> {
    if health_factor > 0.0 {
        Some((1.0 - 1.0 / health_factor) * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::TokenMetadata;
    use crate::types::TokenAmount;
    use ethers::types::{H160, U256};

    fn normalizer() -> (PositionNormalizer, Arc<TokenMetadataCache>) {
        let tokens = Arc::new(TokenMetadataCache::new());
        (PositionNormalizer::new(tokens.clone()), tokens)
    }

    fn reading(health_factor: Option<f64>, debt_amount: f64) -> RawReading {
        RawReading {
            market_id: "0xabc".to_string(),
            market_name: "Test Market".to_string(),
            health_factor,
            collateral: RawBalance::Scaled(Asset::new("USD", 100.0, 100.0, 8)),
            debt: RawBalance::Scaled(Asset::new("USD", debt_amount, debt_amount, 8)),
            liquidation_price: None,
            liquidation_drop_pct: None,
            app_url: None,
        }
    }

    #[tokio::test]
    async fn test_valid_reading_becomes_position() {
        let (normalizer, _) = normalizer();
        let position = normalizer
            .normalize("neverland", "Neverland", None, reading(Some(1.5), 40.0))
            .await
            .unwrap();
        assert_eq!(position.protocol_id, "neverland");
        assert!((position.health_factor - 1.5).abs() < 1e-12);
        assert!((position.liquidation_drop_pct.unwrap() - 33.333333333333336).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sentinel_health_is_dropped() {
        let (normalizer, _) = normalizer();
        assert!(normalizer
            .normalize("neverland", "Neverland", None, reading(Some(1e12), 40.0))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_or_zero_health_is_dropped() {
        let (normalizer, _) = normalizer();
        assert!(normalizer
            .normalize("morpho", "Morpho", None, reading(None, 40.0))
            .await
            .is_none());
        assert!(normalizer
            .normalize("morpho", "Morpho", None, reading(Some(0.0), 40.0))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_zero_debt_is_dropped() {
        let (normalizer, _) = normalizer();
        assert!(normalizer
            .normalize("morpho", "Morpho", None, reading(Some(2.0), 0.0))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_token_legs_scale_and_sum_with_cached_metadata() {
        let (normalizer, tokens) = normalizer();
        let usdc = H160::from_low_u64_be(1);
        let weth = H160::from_low_u64_be(2);
        tokens.insert(
            usdc,
            TokenMetadata {
                symbol: "USDC".to_string(),
                decimals: 6,
            },
        );
        tokens.insert(
            weth,
            TokenMetadata {
                symbol: "WETH".to_string(),
                decimals: 18,
            },
        );

        let mut r = reading(Some(1.4), 50.0);
        r.collateral = RawBalance::Tokens(vec![
            TokenAmount {
                token: usdc,
                raw: U256::from(2_000_000u64), // 2.0 at 6 decimals
                fallback_symbol: "?".to_string(),
            },
            TokenAmount {
                token: weth,
                raw: U256::from(3_000_000_000_000_000_000u128), // 3.0 at 18
                fallback_symbol: "?".to_string(),
            },
        ]);

        let position = normalizer
            .normalize("curvance", "Curvance", None, r)
            .await
            .unwrap();
        assert!((position.collateral.amount - 5.0).abs() < 1e-9);
        assert_eq!(position.collateral.symbol, "USDC+WETH");
    }

    #[tokio::test]
    async fn test_token_leg_metadata_miss_uses_fallback() {
        let (normalizer, _) = normalizer();
        let mut r = reading(Some(1.4), 50.0);
        r.collateral = RawBalance::Tokens(vec![TokenAmount {
            token: H160::from_low_u64_be(9),
            raw: U256::from(1_000_000_000_000_000_000u128),
            fallback_symbol: "cMON".to_string(),
        }]);

        let position = normalizer
            .normalize("curvance", "Curvance", None, r)
            .await
            .unwrap();
        assert_eq!(position.collateral.symbol, "cMON");
        assert!((position.collateral.amount - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_underwater_position_keeps_drop_pct() {
        let (normalizer, _) = normalizer();
        let position = normalizer
            .normalize("neverland", "Neverland", None, reading(Some(0.9), 40.0))
            .await
            .unwrap();
        // Already liquidatable: the figure goes negative rather than away.
        let pct = position.liquidation_drop_pct.unwrap();
        assert!((pct - (1.0 - 1.0 / 0.9) * 100.0).abs() < 1e-9);
        assert!(pct < 0.0);
    }

    #[tokio::test]
    async fn test_existing_drop_pct_is_preserved() {
        let (normalizer, _) = normalizer();
        let mut r = reading(Some(2.0), 40.0);
        r.liquidation_drop_pct = Some(12.5);
        let position = normalizer
            .normalize("morpho", "Morpho", None, r)
            .await
            .unwrap();
        assert_eq!(position.liquidation_drop_pct, Some(12.5));
    }
}
