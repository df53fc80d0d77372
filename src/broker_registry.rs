//! The set of brokers the cluster currently believes in.
use std::{collections::HashMap, sync::Arc};

use crate::{
    broker::{Broker, ConnectionSettings},
    error::{Error, Result},
    network::BrokerAddress,
};

/// Broker id to [`Broker`] mapping, reconciled against each metadata
/// response.
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: HashMap<i32, Arc<Broker>>,
    settings: ConnectionSettings,
}

impl BrokerRegistry {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            brokers: HashMap::new(),
            settings,
        }
    }

    /// Fails with [`Error::UnknownBroker`] when the id is not registered,
    /// which means the caller's topology is out of date.
    pub fn get(&self, broker_id: i32) -> Result<Arc<Broker>> {
        self.brokers
            .get(&broker_id)
            .cloned()
            .ok_or(Error::UnknownBroker(broker_id))
    }

    pub fn contains(&self, broker_id: i32) -> bool {
        self.brokers.contains_key(&broker_id)
    }

    /// Make the registry match `brokers`.
    ///
    /// New ids get an unconnected [`Broker`]; ids present on both sides
    /// keep their existing handle and connections untouched. A broker whose
    /// address changed is replaced like a removed one. The removed handles
    /// are returned so the caller can retire them once the new state is
    /// published.
    pub fn reconcile(&mut self, brokers: &[(i32, BrokerAddress)]) -> Vec<Arc<Broker>> {
        let mut removed = vec![];
        let mut next = HashMap::with_capacity(brokers.len());

        for (id, addr) in brokers.iter() {
            match self.brokers.remove(id) {
                Some(existing) if existing.addr() == addr => {
                    next.insert(*id, existing);
                }
                previous => {
                    if let Some(previous) = previous {
                        tracing::info!(
                            "Broker {} moved from {} to {}",
                            id,
                            previous.addr(),
                            addr
                        );
                        removed.push(previous);
                    } else {
                        tracing::info!("Discovered broker {} at {}", id, addr);
                    }
                    next.insert(
                        *id,
                        Arc::new(Broker::new(*id, addr.clone(), self.settings.clone())),
                    );
                }
            }
        }

        for (id, broker) in self.brokers.drain() {
            tracing::info!("Broker {} at {} left the cluster", id, broker.addr());
            removed.push(broker);
        }
        self.brokers = next;
        removed
    }

    /// Brokers in the order metadata requests should try them: alive
    /// ones first, then by id.
    pub fn candidates(&self) -> Vec<Arc<Broker>> {
        let mut brokers: Vec<Arc<Broker>> = self.brokers.values().cloned().collect();
        brokers.sort_by_key(|broker| (!broker.is_alive(), broker.id()));
        brokers
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.brokers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Broker>> {
        self.brokers.values()
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Empty the registry, handing back every broker it held.
    pub fn clear(&mut self) -> Vec<Arc<Broker>> {
        self.brokers.drain().map(|(_, broker)| broker).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(port: u16) -> BrokerAddress {
        BrokerAddress::new("localhost", port)
    }

    fn registry(ids: &[i32]) -> BrokerRegistry {
        let mut registry = BrokerRegistry::new(ConnectionSettings::default());
        let brokers: Vec<_> = ids.iter().map(|id| (*id, addr(9000 + *id as u16))).collect();
        assert!(registry.reconcile(&brokers).is_empty());
        registry
    }

    #[test]
    fn unknown_broker() {
        let registry = registry(&[1]);
        assert!(registry.get(1).is_ok());
        assert_eq!(registry.get(2).unwrap_err(), Error::UnknownBroker(2));
    }

    #[test]
    fn reconcile_keeps_existing_handles() {
        let mut registry = registry(&[1, 2]);
        let before = registry.get(1).unwrap();

        let removed = registry.reconcile(&[(1, addr(9001)), (2, addr(9002))]);

        assert!(removed.is_empty());
        assert!(Arc::ptr_eq(&before, &registry.get(1).unwrap()));
    }

    #[test]
    fn reconcile_adds_and_removes() {
        let mut registry = registry(&[1, 2, 3]);
        let kept = registry.get(2).unwrap();

        let removed = registry.reconcile(&[(1, addr(9001)), (2, addr(9002)), (7, addr(9007))]);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), 3);
        assert_eq!(registry.ids(), vec![1, 2, 7]);
        assert!(Arc::ptr_eq(&kept, &registry.get(2).unwrap()));
        assert!(!registry.get(7).unwrap().is_connected());
    }

    #[test]
    fn moved_broker_is_replaced() {
        let mut registry = registry(&[1]);
        let before = registry.get(1).unwrap();

        let removed = registry.reconcile(&[(1, addr(9100))]);

        assert_eq!(removed.len(), 1);
        assert!(Arc::ptr_eq(&before, &removed[0]));
        assert_eq!(registry.get(1).unwrap().addr(), &addr(9100));
    }

    #[test]
    fn candidates_sorted_by_id() {
        let registry = registry(&[3, 1, 2]);
        let ids: Vec<i32> = registry.candidates().iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn clear_returns_everything() {
        let mut registry = registry(&[1, 2]);
        assert_eq!(registry.clear().len(), 2);
        assert!(registry.is_empty());
    }
}
