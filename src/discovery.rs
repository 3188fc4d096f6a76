use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ethers::types::H160;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::blockchain::TokenMetadataCache;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::normalizer::PositionNormalizer;
use crate::protocols::{
    CurvanceAdapter, EulerAdapter, MorphoAdapter, NeverlandAdapter, ProtocolAdapter,
};
use crate::types::Position;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
}

/// Fans a wallet address out to every registered protocol adapter, funnels
/// the raw readings through the normalizer, and returns canonical positions
/// grouped per protocol, each group sorted worst-first.
///
/// Each adapter runs as its own spawned task under a hard timeout, so one
/// slow or broken protocol degrades coverage instead of blocking the whole
/// scan. Results are cached per (protocol, wallet) pair; a repeat query
/// within the TTL does not touch the chain at all.
pub struct PositionDiscoveryEngine {
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
    normalizer: Arc<PositionNormalizer>,
    cache: TtlCache<String, Vec<Position>>,
    adapter_timeout: Duration,
}

impl PositionDiscoveryEngine {
    pub fn new(cache_ttl: Duration, adapter_timeout: Duration) -> Self {
        let tokens = Arc::new(TokenMetadataCache::new());
        Self {
            adapters: Vec::new(),
            normalizer: Arc::new(PositionNormalizer::new(tokens)),
            cache: TtlCache::new(cache_ttl),
            adapter_timeout,
        }
    }

    /// Build an engine with every enabled protocol from the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let discovery = &config.discovery;
        let mut engine = Self::new(
            Duration::from_secs(discovery.cache_ttl_secs),
            Duration::from_secs(discovery.adapter_timeout_secs),
        );
        let protocols = &config.protocols;
        if protocols.neverland.enabled {
            engine.register(Arc::new(NeverlandAdapter::new(&protocols.neverland)?));
        }
        if protocols.morpho.enabled {
            engine.register(Arc::new(MorphoAdapter::new(&protocols.morpho)?));
        }
        if protocols.curvance.enabled {
            engine.register(Arc::new(CurvanceAdapter::new(
                &protocols.curvance,
                discovery.manager_probe_cap,
            )?));
        }
        if protocols.euler.enabled {
            engine.register(Arc::new(EulerAdapter::new(&protocols.euler)?));
        }
        info!("Discovery engine ready with {} protocol(s)", engine.adapters.len());
        Ok(engine)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        debug!("Registered protocol adapter: {}", adapter.protocol_id());
        self.adapters.push(adapter);
    }

    pub fn protocol_ids(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.protocol_id()).collect()
    }

    /// Discover all positions for a wallet, across every registered protocol
    /// or just the one named by `protocol_filter`. Protocol groups follow
    /// registration order; within a group, riskiest positions come first.
    pub async fn discover(
        &self,
        wallet: H160,
        protocol_filter: Option<&str>,
    ) -> std::result::Result<Vec<Position>, DiscoveryError> {
        let selected = self.select_adapters(protocol_filter)?;

        enum Slot {
            Ready(Vec<Position>),
            Pending(&'static str, JoinHandle<Vec<Position>>),
        }

        let mut slots = Vec::with_capacity(selected.len());
        for adapter in selected {
            let key = format!("{}:{:#x}", adapter.protocol_id(), wallet);
            if let Some(cached) = self.cache.get(&key) {
                debug!("{}: cache hit for {:#x}", adapter.protocol_id(), wallet);
                slots.push(Slot::Ready(cached));
                continue;
            }
            let protocol_id = adapter.protocol_id();
            let normalizer = Arc::clone(&self.normalizer);
            let cache = self.cache.clone();
            let timeout = self.adapter_timeout;
            slots.push(Slot::Pending(
                protocol_id,
                tokio::spawn(async move {
                    let readings =
                        match tokio::time::timeout(timeout, adapter.discover_positions(wallet))
                            .await
                        {
                            Ok(readings) => readings,
                            Err(_) => {
                                warn!(
                                    "{}: discovery timed out after {:?} for {:#x}",
                                    adapter.protocol_id(),
                                    timeout,
                                    wallet
                                );
                                // Timeouts are not cached: the next query
                                // should retry the source.
                                return Vec::new();
                            }
                        };
                    let mut positions = Vec::with_capacity(readings.len());
                    for reading in readings {
                        if let Some(position) = normalizer
                            .normalize(
                                adapter.protocol_id(),
                                adapter.display_name(),
                                adapter.chain_client(),
                                reading,
                            )
                            .await
                        {
                            positions.push(position);
                        }
                    }
                    sort_worst_first(&mut positions);
                    cache.insert(key, positions.clone());
                    positions
                }),
            ));
        }

        // Each slot is one protocol group; group order follows adapter
        // registration, each group already sorted worst-first.
        let mut groups: Vec<Vec<Position>> = Vec::with_capacity(slots.len());
        let mut pending_slots = Vec::new();
        let mut pending = Vec::new();
        for slot in slots {
            match slot {
                Slot::Ready(cached) => groups.push(cached),
                Slot::Pending(protocol_id, handle) => {
                    groups.push(Vec::new());
                    pending_slots.push((groups.len() - 1, protocol_id));
                    pending.push(handle);
                }
            }
        }
        for ((index, protocol_id), joined) in
            pending_slots.into_iter().zip(join_all(pending).await)
        {
            match joined {
                Ok(found) => groups[index] = found,
                Err(e) => warn!("{}: discovery task aborted: {}", protocol_id, e),
            }
        }

        Ok(groups.into_iter().flatten().collect())
    }

    fn select_adapters(
        &self,
        protocol_filter: Option<&str>,
    ) -> std::result::Result<Vec<Arc<dyn ProtocolAdapter>>, DiscoveryError> {
        match protocol_filter {
            None => Ok(self.adapters.clone()),
            Some(id) => {
                let id = id.to_ascii_lowercase();
                self.adapters
                    .iter()
                    .find(|a| a.protocol_id() == id)
                    .cloned()
                    .map(|a| vec![a])
                    .ok_or(DiscoveryError::UnknownProtocol(id))
            }
        }
    }
}

/// Ascending by health factor, riskiest first.
fn sort_worst_first(positions: &mut [Position]) {
    positions.sort_by(|a, b| {
        a.health_factor
            .partial_cmp(&b.health_factor)
            .unwrap_or(Ordering::Equal)
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub total_positions: usize,
    pub positions_per_protocol: BTreeMap<String, usize>,
    pub worst_health_factor: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

/// Aggregate view over a discovery result.
pub fn summarize(positions: &[Position]) -> DiscoverySummary {
    let mut per_protocol: BTreeMap<String, usize> = BTreeMap::new();
    for position in positions {
        *per_protocol.entry(position.protocol_id.clone()).or_insert(0) += 1;
    }
    DiscoverySummary {
        total_positions: positions.len(),
        positions_per_protocol: per_protocol,
        worst_health_factor: positions
            .iter()
            .map(|p| p.health_factor)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal)),
        last_updated: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainClient;
    use crate::types::{Asset, RawBalance, RawReading};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn reading(market_id: &str, health_factor: f64) -> RawReading {
        RawReading {
            market_id: market_id.to_string(),
            market_name: market_id.to_string(),
            health_factor: Some(health_factor),
            collateral: RawBalance::Scaled(Asset::new("USD", 100.0, 100.0, 8)),
            debt: RawBalance::Scaled(Asset::new("USD", 40.0, 40.0, 8)),
            liquidation_price: None,
            liquidation_drop_pct: None,
            app_url: None,
        }
    }

    struct StubAdapter {
        id: &'static str,
        readings: Vec<RawReading>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl StubAdapter {
        fn new(id: &'static str, readings: Vec<RawReading>) -> Self {
            Self {
                id,
                readings,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn hanging(id: &'static str, delay: Duration) -> Self {
            Self {
                id,
                readings: vec![reading("never-returned", 0.5)],
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::Relaxed)
        }
    }

    #[async_trait]
    impl ProtocolAdapter for StubAdapter {
        fn protocol_id(&self) -> &'static str {
            self.id
        }

        fn display_name(&self) -> &'static str {
            self.id
        }

        fn chain_client(&self) -> Option<&ChainClient> {
            None
        }

        async fn discover_positions(&self, _wallet: H160) -> Vec<RawReading> {
            self.calls.fetch_add(1, AtomicOrdering::Relaxed);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.readings.clone()
        }
    }

    fn engine() -> PositionDiscoveryEngine {
        PositionDiscoveryEngine::new(Duration::from_secs(30), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_results_sorted_worst_first() {
        let mut engine = engine();
        engine.register(Arc::new(StubAdapter::new(
            "stub",
            vec![
                reading("m1", 2.1),
                reading("m2", 1.05),
                reading("m3", 1.8),
            ],
        )));

        let positions = engine
            .discover(H160::from_low_u64_be(1), None)
            .await
            .unwrap();
        let factors: Vec<f64> = positions.iter().map(|p| p.health_factor).collect();
        assert_eq!(factors, vec![1.05, 1.8, 2.1]);
    }

    #[tokio::test]
    async fn test_protocol_groups_follow_registration_order() {
        let mut engine = engine();
        engine.register(Arc::new(StubAdapter::new("alpha", vec![reading("m1", 1.9)])));
        engine.register(Arc::new(StubAdapter::new("beta", vec![reading("m2", 1.1)])));

        // Groups stay in registration order even when a later group holds
        // the riskier position; sorting is per group.
        let positions = engine
            .discover(H160::from_low_u64_be(1), None)
            .await
            .unwrap();
        assert_eq!(positions[0].protocol_id, "alpha");
        assert_eq!(positions[1].protocol_id, "beta");
    }

    #[tokio::test]
    async fn test_repeat_query_within_ttl_hits_cache() {
        let mut engine = engine();
        let adapter = Arc::new(StubAdapter::new("stub", vec![reading("m1", 1.5)]));
        engine.register(adapter.clone());

        let wallet = H160::from_low_u64_be(1);
        let first = engine.discover(wallet, None).await.unwrap();
        let second = engine.discover(wallet, None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_wallets_do_not_share_cache() {
        let mut engine = engine();
        let adapter = Arc::new(StubAdapter::new("stub", vec![reading("m1", 1.5)]));
        engine.register(adapter.clone());

        engine.discover(H160::from_low_u64_be(1), None).await.unwrap();
        engine.discover(H160::from_low_u64_be(2), None).await.unwrap();
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_hanging_adapter_degrades_to_partial_results() {
        let mut engine = engine();
        engine.register(Arc::new(StubAdapter::hanging(
            "slow",
            Duration::from_secs(10),
        )));
        engine.register(Arc::new(StubAdapter::new("fast", vec![reading("m1", 1.3)])));

        let positions = engine
            .discover(H160::from_low_u64_be(1), None)
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].protocol_id, "fast");
    }

    #[tokio::test]
    async fn test_protocol_filter_selects_one_adapter() {
        let mut engine = engine();
        let first = Arc::new(StubAdapter::new("first", vec![reading("m1", 1.5)]));
        let second = Arc::new(StubAdapter::new("second", vec![reading("m2", 1.9)]));
        engine.register(first.clone());
        engine.register(second.clone());

        let positions = engine
            .discover(H160::from_low_u64_be(1), Some("second"))
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].protocol_id, "second");
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_protocol_filter_is_an_error() {
        let engine = engine();
        let err = engine
            .discover(H160::from_low_u64_be(1), Some("nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnknownProtocol(name) if name == "nonexistent"));
    }

    #[test]
    fn test_summary_counts_per_protocol() {
        let mut positions = Vec::new();
        for (protocol, hf) in [("a", 1.2), ("a", 2.0), ("b", 1.7)] {
            positions.push(Position {
                protocol_id: protocol.to_string(),
                protocol_name: protocol.to_string(),
                market_id: "m".to_string(),
                market_name: "m".to_string(),
                health_factor: hf,
                collateral: Asset::new("USD", 1.0, 1.0, 8),
                debt: Asset::new("USD", 1.0, 1.0, 8),
                liquidation_price: None,
                liquidation_drop_pct: None,
                app_url: None,
            });
        }
        let summary = summarize(&positions);
        assert_eq!(summary.total_positions, 3);
        assert_eq!(summary.positions_per_protocol["a"], 2);
        assert_eq!(summary.positions_per_protocol["b"], 1);
        assert_eq!(summary.worst_health_factor, Some(1.2));
    }
}
