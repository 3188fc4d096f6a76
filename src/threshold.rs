use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ALERT_THRESHOLD;

/// Per-market override map inside one protocol's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolOverride {
    /// Protocol-wide threshold, applied when no market override matches.
    pub threshold: Option<f64>,
    /// Keyed by market id (manager address, market unique key, vault
    /// address), stored lowercase.
    #[serde(default)]
    pub market_overrides: HashMap<String, f64>,
}

/// Threshold settings for one watched address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub default_threshold: f64,
    #[serde(default)]
    pub protocol_overrides: HashMap<String, ProtocolOverride>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_ALERT_THRESHOLD,
            protocol_overrides: HashMap::new(),
        }
    }
}

/// All watched addresses for one subscriber (chat, channel, user).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatThresholds {
    /// Keyed by wallet address, stored lowercase.
    #[serde(default)]
    pub addresses: HashMap<String, ThresholdConfig>,
}

impl ChatThresholds {
    pub fn set_address(&mut self, address: &str, config: ThresholdConfig) {
        self.addresses.insert(address.to_ascii_lowercase(), config);
    }
}

/// Resolves the alert threshold for a position with fixed precedence:
/// market override, then protocol override, then the address default, then
/// the global default. The most specific match always wins, even when a
/// coarser level sets a stricter value.
pub struct ThresholdResolver;

impl ThresholdResolver {
    pub fn resolve(
        chat: &ChatThresholds,
        address: &str,
        protocol_id: &str,
        market_id: Option<&str>,
    ) -> f64 {
        let address = address.to_ascii_lowercase();
        let Some(config) = chat.addresses.get(&address) else {
            return DEFAULT_ALERT_THRESHOLD;
        };
        let protocol = config.protocol_overrides.get(&protocol_id.to_ascii_lowercase());
        if let (Some(protocol), Some(market_id)) = (protocol, market_id) {
            if let Some(&threshold) = protocol
                .market_overrides
                .get(&market_id.to_ascii_lowercase())
            {
                return threshold;
            }
        }
        if let Some(threshold) = protocol.and_then(|p| p.threshold) {
            return threshold;
        }
        config.default_threshold
    }
}
