//! Topics & partitions as seen by the last metadata refresh.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::{error::KafkaCode, protocol::metadata::response};

/// Immutable snapshot of one partition.
///
/// Partitions are never patched in place; a refresh replaces the whole
/// partition map of a topic at once.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    pub id: i32,
    /// The broker leading this partition, `None` while an election is
    /// in progress.
    pub leader: Option<i32>,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    /// Error the broker reported for this partition, if any.
    pub error_code: KafkaCode,
}

impl From<&response::Partition> for Partition {
    fn from(p: &response::Partition) -> Self {
        Self {
            id: p.partition_index,
            leader: (p.leader_id >= 0).then_some(p.leader_id),
            replicas: p.replica_nodes.clone(),
            isr: p.isr_nodes.clone(),
            error_code: p.error_code,
        }
    }
}

pub type PartitionMap = HashMap<i32, Partition>;

/// A topic and its partition leaders.
///
/// Handed out as `Arc<Topic>`. While a caller holds one, the cluster keeps
/// updating it in place on every refresh that covers the topic; once no
/// caller holds it, the registry may drop it and rebuild it from fresh
/// metadata later.
#[derive(Debug)]
pub struct Topic {
    name: String,
    partitions: RwLock<Arc<PartitionMap>>,
    stale: AtomicBool,
    generation: AtomicU64,
}

impl Topic {
    pub fn new(name: impl Into<String>, partitions: PartitionMap, generation: u64) -> Self {
        Self {
            name: name.into(),
            partitions: RwLock::new(Arc::new(partitions)),
            stale: AtomicBool::new(false),
            generation: AtomicU64::new(generation),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topics the brokers use for their own bookkeeping, such as the
    /// consumer offsets topic.
    pub fn is_internal(&self) -> bool {
        is_internal(&self.name)
    }

    /// The current partition map. Later refreshes do not alter the
    /// returned snapshot.
    pub fn partitions(&self) -> Arc<PartitionMap> {
        self.partitions.read().clone()
    }

    pub fn partition(&self, id: i32) -> Option<Partition> {
        self.partitions.read().get(&id).cloned()
    }

    /// Partition ids in ascending order.
    pub fn partition_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.partitions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn leader(&self, partition: i32) -> Option<i32> {
        self.partitions.read().get(&partition)?.leader
    }

    /// Set when a request against this topic hit stale topology, or the
    /// topic disappeared from the cluster. Cleared by the next refresh
    /// that includes the topic.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn mark_stale(&self) {
        if !self.stale.swap(true, Ordering::AcqRel) {
            tracing::debug!("Marked topic {} stale", self.name);
        }
    }

    /// The refresh generation that last produced this topic's partitions.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn replace(&self, partitions: PartitionMap, generation: u64) {
        *self.partitions.write() = Arc::new(partitions);
        self.generation.store(generation, Ordering::Release);
        self.stale.store(false, Ordering::Release);
    }
}

pub(crate) fn is_internal(name: &str) -> bool {
    name.starts_with("__")
}

#[cfg(test)]
mod test {
    use super::*;

    fn partition(id: i32, leader: i32) -> Partition {
        Partition {
            id,
            leader: Some(leader),
            replicas: vec![leader],
            isr: vec![leader],
            error_code: KafkaCode::None,
        }
    }

    #[test]
    fn leaderless_partition() {
        let p = Partition::from(&response::Partition {
            error_code: KafkaCode::LeaderNotAvailable,
            partition_index: 4,
            leader_id: -1,
            replica_nodes: vec![1, 2],
            isr_nodes: vec![],
        });
        assert_eq!(p.id, 4);
        assert_eq!(p.leader, None);
        assert_eq!(p.replicas, vec![1, 2]);
    }

    #[test]
    fn replace_swaps_whole_map() {
        let topic = Topic::new(
            "purchases",
            HashMap::from([(0, partition(0, 1)), (1, partition(1, 2))]),
            1,
        );
        let before = topic.partitions();
        topic.mark_stale();

        topic.replace(HashMap::from([(0, partition(0, 2))]), 2);

        assert_eq!(topic.leader(0), Some(2));
        assert_eq!(topic.partition(1), None);
        assert_eq!(topic.partition_ids(), vec![0]);
        assert_eq!(topic.generation(), 2);
        assert!(!topic.is_stale());
        // old snapshot untouched
        assert_eq!(before.len(), 2);
        assert_eq!(before[&0].leader, Some(1));
    }

    #[test]
    fn internal_topics() {
        assert!(Topic::new("__consumer_offsets", PartitionMap::new(), 0).is_internal());
        assert!(!Topic::new("purchases", PartitionMap::new(), 0).is_internal());
    }
}
