//! The Selector implements the four load-balancing strategies over a
//! filtered candidate set (§4.3).
//!
//! Shape borrowed from the pack's load-balancer modules (tonic's
//! `load_balancing`, linkerd-tcp's `balancer::manager`): resolve a
//! candidate list, then apply one strategy. The candidate filter itself
//! (active, not busy, not quarantined) is spec-original.

use rand::Rng;

use crate::config::{LoadBalancerStrategy, PoolConfig};
use crate::connection::{Connection, ConnectionId};
use crate::registry::Registry;
use crate::ProviderId;

/// Selects a candidate connection for a provider according to the
/// configured load-balancing strategy.
///
/// Plain (non-atomic) state, deliberately: §5 requires the rolling
/// round-robin index to be mutated only under the pool's single logical
/// mutex, alongside the Registry and Waiter Queue it lives next to in
/// `Internals`.
#[derive(Debug, Default)]
pub(crate) struct Selector {
    // A single process-wide rolling index, per §4.3 ("process-wide rolling
    // index"), not one per provider.
    round_robin_index: usize,
}

impl Selector {
    pub(crate) fn new() -> Selector {
        Selector::default()
    }

    fn candidates<'a>(
        &self,
        registry: &'a Registry,
        provider_id: &ProviderId,
    ) -> Vec<&'a Connection> {
        registry
            .connection_ids_for(provider_id)
            .iter()
            .filter_map(|&id| registry.get(id))
            .filter(|c| c.is_selectable())
            .collect()
    }

    /// Resolves the candidate set and applies the configured strategy.
    /// Returns `None` if no eligible candidate exists.
    pub(crate) fn select(
        &mut self,
        registry: &Registry,
        config: &PoolConfig,
        provider_id: &ProviderId,
    ) -> Option<ConnectionId> {
        let candidates = self.candidates(registry, provider_id);
        if candidates.is_empty() {
            return None;
        }

        let chosen = match config.strategy {
            LoadBalancerStrategy::RoundRobin => self.round_robin(&candidates),
            LoadBalancerStrategy::LeastConnections => Self::least_connections(&candidates),
            LoadBalancerStrategy::Weighted => {
                Self::weighted(&candidates, config.weight_for(provider_id))
            }
            LoadBalancerStrategy::LatencyBased => Self::latency_based(&candidates),
        };

        chosen.map(Connection::id)
    }

    fn round_robin<'a>(&mut self, candidates: &[&'a Connection]) -> &'a Connection {
        let idx = self.round_robin_index;
        self.round_robin_index = self.round_robin_index.wrapping_add(1);
        candidates[idx % candidates.len()]
    }

    fn least_connections<'a>(candidates: &[&'a Connection]) -> &'a Connection {
        candidates
            .iter()
            .copied()
            .min_by_key(|c| c.request_count())
            .expect("candidates is non-empty")
    }

    fn weighted<'a>(candidates: &[&'a Connection], _weight: f64) -> &'a Connection {
        // All candidates for one provider share the same configured weight
        // (weights are keyed by provider, not by connection), so a weighted
        // pick among same-provider candidates degenerates to a uniform
        // random pick; the weight only matters when comparing providers,
        // which is the Queue Pump's concern, not the Selector's.
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        candidates[idx]
    }

    fn latency_based<'a>(candidates: &[&'a Connection]) -> &'a Connection {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| {
            a.avg_response_time_ms()
                .partial_cmp(&b.avg_response_time_ms())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if sorted.len() >= 2 {
            let gap = (sorted[1].avg_response_time_ms() - sorted[0].avg_response_time_ms()).abs();
            if gap < 10.0 {
                sorted.sort_by(|a, b| b.health_score().cmp(&a.health_score()));
            }
        }

        sorted[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::time::Duration;

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name)
    }

    fn registry_with(n: usize, provider_id: &ProviderId) -> (Registry, Vec<ConnectionId>) {
        let mut reg = Registry::new();
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(reg.insert(Connection::new(provider_id.clone(), 3)));
        }
        (reg, ids)
    }

    #[test]
    fn empty_candidate_set_returns_none() {
        let reg = Registry::new();
        let cfg = PoolConfig::default();
        let mut sel = Selector::new();
        assert!(sel.select(&reg, &cfg, &provider("A")).is_none());
    }

    #[test]
    fn round_robin_cycles_through_candidates() {
        let p = provider("A");
        let (reg, ids) = registry_with(3, &p);
        let cfg = PoolConfig::builder()
            .strategy(LoadBalancerStrategy::RoundRobin)
            .build();
        let mut sel = Selector::new();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sel.select(&reg, &cfg, &p).unwrap());
        }
        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn least_connections_picks_min_request_count() {
        let p = provider("A");
        let mut reg = Registry::new();
        let mut busy_heavy = Connection::new(p.clone(), 3);
        busy_heavy.mark_busy();
        busy_heavy.mark_idle();
        busy_heavy.mark_busy();
        busy_heavy.mark_idle();
        let heavy_id = reg.insert(busy_heavy);
        let light_id = reg.insert(Connection::new(p.clone(), 3));

        let cfg = PoolConfig::builder()
            .strategy(LoadBalancerStrategy::LeastConnections)
            .build();
        let mut sel = Selector::new();
        let chosen = sel.select(&reg, &cfg, &p).unwrap();
        assert_eq!(chosen, light_id);
        assert_ne!(chosen, heavy_id);
    }

    #[test]
    fn latency_based_prefers_lower_latency_outside_tie_window() {
        let p = provider("A");
        let mut reg = Registry::new();
        let mut fast = Connection::new(p.clone(), 3);
        fast.record_probe_success(Duration::from_millis(1));
        let fast_id = reg.insert(fast);

        let mut slow = Connection::new(p.clone(), 3);
        slow.record_probe_success(Duration::from_millis(200));
        reg.insert(slow);

        let cfg = PoolConfig::builder()
            .strategy(LoadBalancerStrategy::LatencyBased)
            .build();
        let mut sel = Selector::new();
        assert_eq!(sel.select(&reg, &cfg, &p).unwrap(), fast_id);
    }

    #[test]
    fn latency_based_breaks_near_ties_on_health_score() {
        let p = provider("A");
        let mut reg = Registry::new();

        // Both land around the same avg_response_time (within 10ms), so the
        // tiebreaker (higher health score) decides.
        let mut healthier = Connection::new(p.clone(), 3);
        healthier.record_probe_success(Duration::from_millis(5));
        let healthier_id = reg.insert(healthier);

        let mut less_healthy = Connection::new(p.clone(), 3);
        less_healthy.record_probe_failure();
        less_healthy.record_probe_success(Duration::from_millis(5));
        reg.insert(less_healthy);

        let cfg = PoolConfig::builder()
            .strategy(LoadBalancerStrategy::LatencyBased)
            .build();
        let mut sel = Selector::new();
        assert_eq!(sel.select(&reg, &cfg, &p).unwrap(), healthier_id);
    }

    #[test]
    fn selector_never_returns_busy_or_quarantined_connections() {
        let p = provider("A");
        let mut reg = Registry::new();
        let mut busy = Connection::new(p.clone(), 3);
        busy.mark_busy();
        reg.insert(busy);

        let mut quarantined = Connection::new(p.clone(), 1);
        quarantined.record_probe_failure();
        reg.insert(quarantined);

        let cfg = PoolConfig::default();
        let mut sel = Selector::new();
        assert!(sel.select(&reg, &cfg, &p).is_none());
    }
}
