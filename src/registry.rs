//! The Connection Registry and Provider Index (§3), kept in lockstep.
//!
//! An id-indexed map plus a provider index, rather than one flat deque,
//! since this pool serves many providers out of one registry.

use std::collections::HashMap;

use crate::connection::{Connection, ConnectionId};
use crate::ProviderId;

/// Owns every `Connection` record, indexed by id and by provider.
///
/// Maintains invariants 1-3 from §8: total size bounded by `max_connections`,
/// per-provider size bounded by `max_connections`, and the provider index
/// stays consistent with each connection's `provider_id`.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    // Insertion-ordered so queue-pump iteration is stable within one pump
    // (§4.2) without needing a second sorted structure.
    provider_order: Vec<ProviderId>,
    by_provider: HashMap<ProviderId, Vec<ConnectionId>>,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn provider_len(&self, provider_id: &ProviderId) -> usize {
        self.by_provider.get(provider_id).map_or(0, Vec::len)
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Providers in first-seen (insertion) order — the order the Queue Pump
    /// iterates in (§4.2, §9 open question on starvation).
    pub(crate) fn providers_in_order(&self) -> impl Iterator<Item = &ProviderId> {
        self.provider_order.iter()
    }

    pub(crate) fn connection_ids_for(&self, provider_id: &ProviderId) -> &[ConnectionId] {
        self.by_provider
            .get(provider_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn all_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Inserts a connection atomically into both the registry and the
    /// provider index.
    pub(crate) fn insert(&mut self, conn: Connection) -> ConnectionId {
        let id = conn.id();
        let provider_id = conn.provider_id().clone();

        self.by_provider
            .entry(provider_id.clone())
            .or_insert_with(|| {
                self.provider_order.push(provider_id.clone());
                Vec::new()
            })
            .push(id);

        self.connections.insert(id, conn);
        id
    }

    /// Removes a connection from both structures. Idempotent: returns
    /// `None` if the id is unknown (§4.1 `Destroy(id)` contract).
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        if let Some(ids) = self.by_provider.get_mut(conn.provider_id()) {
            ids.retain(|&cid| cid != id);
        }
        Some(conn)
    }

    pub(crate) fn busy_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_busy()).count()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_active()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name)
    }

    #[test]
    fn insert_then_remove_keeps_index_consistent() {
        let mut reg = Registry::new();
        let conn = Connection::new(provider("A"), 3);
        let id = conn.id();
        reg.insert(conn);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.provider_len(&provider("A")), 1);
        assert_eq!(reg.connection_ids_for(&provider("A")), &[id]);

        let removed = reg.remove(id);
        assert!(removed.is_some());
        assert_eq!(reg.len(), 0);
        assert_eq!(reg.provider_len(&provider("A")), 0);
        assert!(reg.connection_ids_for(&provider("A")).is_empty());
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut reg = Registry::new();
        let bogus = Connection::new(provider("A"), 3).id();
        assert!(reg.remove(bogus).is_none());
    }

    #[test]
    fn providers_iterate_in_insertion_order() {
        let mut reg = Registry::new();
        reg.insert(Connection::new(provider("B"), 3));
        reg.insert(Connection::new(provider("A"), 3));
        reg.insert(Connection::new(provider("B"), 3));

        let order: Vec<_> = reg.providers_in_order().cloned().collect();
        assert_eq!(order, vec![provider("B"), provider("A")]);
    }

    #[test]
    fn busy_and_active_counts() {
        let mut reg = Registry::new();
        let mut c1 = Connection::new(provider("A"), 3);
        c1.mark_busy();
        let id1 = reg.insert(c1);
        reg.insert(Connection::new(provider("A"), 3));

        assert_eq!(reg.busy_count(), 1);
        assert_eq!(reg.active_count(), 2);

        reg.get_mut(id1).unwrap().deactivate();
        assert_eq!(reg.active_count(), 1);
    }
}
