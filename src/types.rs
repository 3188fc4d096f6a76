use ethers::types::{H160, U256};
use serde::{Deserialize, Serialize};

/// One side (collateral or debt) of a position, in human-readable units.
///
/// `usd_value` may be a rough estimate equal to `amount` where the protocol
/// exposes no price data; that is an accepted approximation, not a bug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub symbol: String,
    pub amount: f64,
    pub usd_value: f64,
    pub decimals: u8,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, amount: f64, usd_value: f64, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            usd_value,
            decimals,
        }
    }
}

/// The canonical unit of risk after normalization.
///
/// `market_id` is the risk aggregation key within the protocol: for pooled
/// protocols whose health is computed per account per market manager it is
/// the manager address, never a finer-grained token address. Constructed
/// fresh on every discovery call and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub protocol_id: String,
    pub protocol_name: String,
    pub market_id: String,
    pub market_name: String,
    pub health_factor: f64,
    pub collateral: Asset,
    pub debt: Asset,
    pub liquidation_price: Option<f64>,
    pub liquidation_drop_pct: Option<f64>,
    pub app_url: Option<String>,
}

impl Position {
    /// Format a token amount with K/M suffixes for chat rendering.
    pub fn format_amount(val: f64) -> String {
        if val >= 1_000_000.0 {
            format!("{:.2}M", val / 1_000_000.0)
        } else if val >= 1_000.0 {
            format!("{:.1}k", val / 1_000.0)
        } else if val >= 1.0 {
            format!("{:.2}", val)
        } else {
            format!("{:.4}", val)
        }
    }

    /// Format a USD value with K/M suffixes.
    pub fn format_usd(val: f64) -> String {
        if val >= 1_000_000.0 {
            format!("${:.2}M", val / 1_000_000.0)
        } else if val >= 1_000.0 {
            format!("${:.2}K", val / 1_000.0)
        } else {
            format!("${:.2}", val)
        }
    }
}

/// A raw on-chain token balance awaiting decimal scaling.
#[derive(Debug, Clone)]
pub struct TokenAmount {
    pub token: H160,
    pub raw: U256,
    /// Symbol used when ERC-20 metadata cannot be fetched.
    pub fallback_symbol: String,
}

/// Pre-normalization balance: either already scaled by the source (indexer
/// figures, base-currency values) or raw token units with one or more legs
/// that the normalizer scales and sums using per-token decimals.
#[derive(Debug, Clone)]
pub enum RawBalance {
    Scaled(Asset),
    Tokens(Vec<TokenAmount>),
}

/// Protocol-specific reading produced by an adapter, before validity
/// filtering and scaling. `health_factor` is already divided by the
/// protocol's fixed-point divisor but not yet sentinel-filtered.
#[derive(Debug, Clone)]
pub struct RawReading {
    pub market_id: String,
    pub market_name: String,
    pub health_factor: Option<f64>,
    pub collateral: RawBalance,
    pub debt: RawBalance,
    pub liquidation_price: Option<f64>,
    pub liquidation_drop_pct: Option<f64>,
    pub app_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_suffixes() {
        assert_eq!(Position::format_amount(2_500_000.0), "2.50M");
        assert_eq!(Position::format_amount(1_500.0), "1.5k");
        assert_eq!(Position::format_amount(42.25), "42.25");
        assert_eq!(Position::format_amount(0.1234), "0.1234");
    }

    #[test]
    fn test_format_usd_suffixes() {
        assert_eq!(Position::format_usd(2_500_000.0), "$2.50M");
        assert_eq!(Position::format_usd(1_500.0), "$1.50K");
        assert_eq!(Position::format_usd(42.5), "$42.50");
    }
}
