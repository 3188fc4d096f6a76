// Shared constants for the discovery core

/// Health factors above this bound are sentinel values ("no active position",
/// max-uint style) and are never surfaced as real positions.
pub const HEALTH_FACTOR_SENTINEL: f64 = 1e10;

/// Global fallback alert threshold when neither a market, protocol, nor
/// address-level value is configured.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 1.5;

/// Standard 18-decimal fixed-point divisor (health factors, token values).
pub const WAD: f64 = 1e18;

/// Aave-style base-currency values carry 8 decimals.
pub const BASE_CURRENCY_UNIT: f64 = 1e8;

// Discovery engine defaults
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 5;

/// Cap on sequential market-manager probes per raw position.
pub const DEFAULT_MANAGER_PROBE_CAP: usize = 8;

// Target chain (Monad)
pub const MONAD_CHAIN_ID: u64 = 143;
pub const DEFAULT_MONAD_RPC_URL: &str = "https://rpc.monad.xyz";

// Protocol endpoints and deployments
pub const MORPHO_GRAPHQL_URL: &str = "https://api.morpho.org/graphql";
pub const NEVERLAND_POOL: &str = "0x80F00661b13CC5F6ccd3885bE7b4C9c67545D585";
pub const CURVANCE_PROTOCOL_READER: &str = "0xBF67b967eCcf21f2C196f947b703e874D5dB649d";
pub const CURVANCE_CENTRAL_REGISTRY: &str = "0x1310f352f1389969Ece6741671c4B919523912fF";
pub const EULER_VAULT_LENS: &str = "0x15d1Cc54fB3f7C0498fc991a23d8Dc00DF3c32A0";

/// Known Curvance market managers on Monad, used when the central registry
/// call fails.
pub const KNOWN_CURVANCE_MARKET_MANAGERS: &[&str] = &[
    "0xd6365555f6a697C7C295bA741100AA644cE28545",
    "0x5EA0a1Cf3501C954b64902c5e92100b8A2CaB1Ac",
    "0xE1C24B2E93230FBe33d32Ba38ECA3218284143e2",
];

// App URLs surfaced alongside positions
pub const NEVERLAND_APP_URL: &str = "https://app.neverland.money";
pub const MORPHO_APP_URL: &str = "https://app.morpho.org/monad";
pub const CURVANCE_APP_URL: &str = "https://app.curvance.com";
pub const EULER_APP_URL: &str = "https://app.euler.finance";
