use ethers::types::{H160, U256};

/// Lossy conversion of a U256 to f64. Values wider than 128 bits collapse to
/// f64::MAX; those only occur for sentinel ("no position") returns and are
/// filtered by the normalizer anyway.
pub fn u256_to_f64(value: U256) -> f64 {
    if value.bits() > 128 {
        return f64::MAX;
    }
    value.as_u128() as f64
}

/// Scale a raw integer token amount to human-readable units.
pub fn scale_units(raw: U256, decimals: u8) -> f64 {
    u256_to_f64(raw) / 10f64.powi(decimals as i32)
}

/// Shorten an address for display: `0x1234...abcd`.
pub fn short_address(address: H160) -> String {
    let full = format!("{:#x}", address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
