//! Cache of topic topology with eviction of unused entries.
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    error::KafkaCode,
    topic::{PartitionMap, Topic},
};

/// Maps topic names to shared [`Topic`] handles.
///
/// Every entry is an `Arc<Topic>`; the registry's own reference is the
/// baseline, so any strong count above one means some caller still holds
/// the topic. Unreferenced entries can be evicted and are rebuilt from
/// fresh metadata when next asked for, instead of lingering forever with
/// whatever topology they last saw.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<String, Arc<Topic>>,
    /// Every topic name the cluster reported, cached or not.
    known: BTreeSet<String>,
    /// Topics whose last metadata carried a topic-level error.
    unavailable: HashMap<String, KafkaCode>,
    generation: u64,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any cached entry, referenced or not.
    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).cloned()
    }

    /// The cached entry, but only if it is fresh and held by at least one
    /// caller. Anything else should be refetched.
    pub fn get_live(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics
            .get(name)
            .filter(|topic| Arc::strong_count(topic) > 1 && !topic.is_stale())
            .cloned()
    }

    /// Number of handles held outside the registry.
    pub fn external_refs(&self, name: &str) -> usize {
        self.topics
            .get(name)
            .map_or(0, |topic| Arc::strong_count(topic) - 1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// Start a new refresh generation; returns its number.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Swap in a new partition map for `name`, creating the entry if it
    /// is not cached. Existing handles observe the new map.
    pub fn update(&mut self, name: &str, partitions: PartitionMap) -> Arc<Topic> {
        self.known.insert(name.to_owned());
        self.unavailable.remove(name);
        let generation = self.generation;
        match self.topics.get(name) {
            Some(topic) => {
                topic.replace(partitions, generation);
                topic.clone()
            }
            None => {
                tracing::debug!("Caching topic {}", name);
                let topic = Arc::new(Topic::new(name, partitions, generation));
                self.topics.insert(name.to_owned(), topic.clone());
                topic
            }
        }
    }

    /// Forget a topic entirely. Outstanding handles are marked stale.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Topic>> {
        self.known.remove(name);
        self.unavailable.remove(name);
        let topic = self.topics.remove(name)?;
        topic.mark_stale();
        Some(topic)
    }

    pub fn mark_stale(&self, name: &str) {
        if let Some(topic) = self.topics.get(name) {
            topic.mark_stale();
        }
    }

    /// Record that the cluster knows `name` but reported `code` for it.
    /// A cached entry keeps its last partitions and is marked stale.
    pub fn mark_unavailable(&mut self, name: &str, code: KafkaCode) {
        self.known.insert(name.to_owned());
        self.unavailable.insert(name.to_owned(), code);
        self.mark_stale(name);
    }

    /// The error last reported for `name`, if it has not recovered since.
    pub fn unavailable(&self, name: &str) -> Option<KafkaCode> {
        self.unavailable.get(name).copied()
    }

    /// Drop every entry no caller holds. Returns the evicted names.
    pub fn evict_unreferenced(&mut self) -> Vec<String> {
        self.evict_where(|_| true)
    }

    /// Drop unreferenced entries last refreshed before `generation`.
    ///
    /// Entries from recent refreshes are spared so that a lookup racing a
    /// concurrent refresh still finds what its own refresh fetched.
    pub fn evict_unreferenced_before(&mut self, generation: u64) -> Vec<String> {
        self.evict_where(|topic| topic.generation() < generation)
    }

    fn evict_where(&mut self, pred: impl Fn(&Topic) -> bool) -> Vec<String> {
        let mut evicted = vec![];
        self.topics.retain(|name, topic| {
            let keep = Arc::strong_count(topic) > 1 || !pred(topic);
            if !keep {
                evicted.push(name.clone());
            }
            keep
        });
        if !evicted.is_empty() {
            tracing::debug!("Evicted unreferenced topics {:?}", evicted);
        }
        evicted
    }

    /// Remove every topic not named in `names`, as after a full refresh.
    pub fn retain_known(&mut self, names: &BTreeSet<String>) -> Vec<String> {
        let vanished: Vec<String> = self.known.difference(names).cloned().collect();
        for name in vanished.iter() {
            tracing::info!("Topic {} no longer exists", name);
            self.remove(name);
        }
        // cached entries that were never in `known` either
        let orphans: Vec<String> = self
            .topics
            .keys()
            .filter(|name| !names.contains(*name))
            .cloned()
            .collect();
        for name in orphans.iter() {
            self.remove(name);
        }
        vanished
    }

    /// Names of every topic reported by the cluster.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    /// Cached handles.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Topic>> {
        self.topics.values()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        for topic in self.topics.values() {
            topic.mark_stale();
        }
        self.topics.clear();
        self.known.clear();
        self.unavailable.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::KafkaCode, topic::Partition};

    fn partitions(leader: i32) -> PartitionMap {
        PartitionMap::from([(
            0,
            Partition {
                id: 0,
                leader: Some(leader),
                replicas: vec![leader],
                isr: vec![leader],
                error_code: KafkaCode::None,
            },
        )])
    }

    #[test]
    fn update_swaps_in_place() {
        let mut registry = TopicRegistry::new();
        let held = registry.update("purchases", partitions(1));

        let again = registry.update("purchases", partitions(2));

        assert!(Arc::ptr_eq(&held, &again));
        assert_eq!(held.leader(0), Some(2));
    }

    #[test]
    fn live_requires_an_outside_holder() {
        let mut registry = TopicRegistry::new();
        let held = registry.update("purchases", partitions(1));
        assert!(registry.get_live("purchases").is_some());
        assert_eq!(registry.external_refs("purchases"), 1);

        drop(held);
        assert!(registry.get_live("purchases").is_none());
        assert!(registry.get("purchases").is_some());
    }

    #[test]
    fn stale_entries_are_not_live() {
        let mut registry = TopicRegistry::new();
        let _held = registry.update("purchases", partitions(1));
        registry.mark_stale("purchases");
        assert!(registry.get_live("purchases").is_none());
    }

    #[test]
    fn evicts_only_unreferenced() {
        let mut registry = TopicRegistry::new();
        let held = registry.update("held", partitions(1));
        registry.update("dropped", partitions(1));

        assert_eq!(registry.evict_unreferenced(), vec![String::from("dropped")]);
        assert!(registry.contains("held"));
        assert!(!registry.contains("dropped"));
        // still listed, just not cached
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["dropped", "held"]);
        drop(held);
    }

    #[test]
    fn eviction_spares_recent_generations() {
        let mut registry = TopicRegistry::new();
        registry.next_generation();
        registry.update("old", partitions(1));
        let current = registry.next_generation();
        registry.update("new", partitions(1));

        assert_eq!(
            registry.evict_unreferenced_before(current),
            vec![String::from("old")]
        );
        assert!(registry.contains("new"));
    }

    #[test]
    fn retain_known_drops_vanished_topics() {
        let mut registry = TopicRegistry::new();
        let gone = registry.update("gone", partitions(1));
        registry.update("kept", partitions(1));

        let names = BTreeSet::from([String::from("kept")]);
        assert_eq!(registry.retain_known(&names), vec![String::from("gone")]);

        assert!(gone.is_stale());
        assert!(!registry.contains("gone"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["kept"]);
    }

    #[test]
    fn unavailable_topics_stay_listed_until_they_recover() {
        let mut registry = TopicRegistry::new();
        registry.mark_unavailable("fresh", KafkaCode::LeaderNotAvailable);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["fresh"]);
        assert!(!registry.contains("fresh"));
        assert_eq!(
            registry.unavailable("fresh"),
            Some(KafkaCode::LeaderNotAvailable)
        );

        registry.update("fresh", partitions(1));
        assert_eq!(registry.unavailable("fresh"), None);
    }

    #[test]
    fn clear_marks_everything_stale() {
        let mut registry = TopicRegistry::new();
        let held = registry.update("purchases", partitions(1));
        registry.clear();
        assert!(held.is_stale());
        assert!(registry.is_empty());
        assert_eq!(registry.names().count(), 0);
    }
}
