use serde::Serialize;
use tracing::debug;

use crate::threshold::{ChatThresholds, ThresholdResolver};
use crate::types::Position;

/// A position that crossed below its resolved alert threshold.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub address: String,
    pub position: Position,
    pub threshold: f64,
}

impl AlertEvent {
    /// One-line chat rendering of the alert.
    pub fn render(&self) -> String {
        let drop = self
            .position
            .liquidation_drop_pct
            .map(|pct| format!(", {:.1}% drop to liquidation", pct))
            .unwrap_or_default();
        format!(
            "⚠️ {} {} health {:.3} below threshold {:.2} (debt {}{})",
            self.position.protocol_name,
            self.position.market_name,
            self.position.health_factor,
            self.threshold,
            Position::format_usd(self.position.debt.usd_value),
            drop
        )
    }
}

pub struct AlertEvaluator;

impl AlertEvaluator {
    /// Evaluate a discovery result against the subscriber's thresholds.
    /// The comparison is strictly below: a position sitting exactly on its
    /// threshold does not alert. Input order (worst-first) is preserved.
    pub fn evaluate(
        chat: &ChatThresholds,
        address: &str,
        positions: &[Position],
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for position in positions {
            let threshold = ThresholdResolver::resolve(
                chat,
                address,
                &position.protocol_id,
                Some(&position.market_id),
            );
            if position.health_factor < threshold {
                debug!(
                    "Alert: {} {} at {:.4} < {:.2}",
                    position.protocol_id, position.market_id, position.health_factor, threshold
                );
                events.push(AlertEvent {
                    address: address.to_string(),
                    position: position.clone(),
                    threshold,
                });
            }
        }
        events
    }
}
