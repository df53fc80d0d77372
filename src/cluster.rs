//! Cluster topology & leader lookup.
//!
//! A [`Cluster`] discovers brokers, tracks which broker leads which
//! partition, and refreshes that picture when it goes stale. It is shared
//! by any number of tasks issuing requests concurrently.
//!
//! Cluster wide state lives behind one lock that is only ever held to read
//! or swap registry contents, never across network I/O. Metadata requests
//! happen outside of it, and at most one refresh is in flight at a time:
//! tasks that ask for a refresh while one is running wait for that one and
//! share its outcome.
use std::{
    collections::BTreeSet,
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::instrument;

use crate::{
    broker::{Broker, ConnectionSettings},
    broker_registry::BrokerRegistry,
    config::ClusterConfig,
    error::{Error, KafkaCode, Result},
    hosts::HostsProvider,
    network::BrokerAddress,
    parser::to_str,
    protocol::{FindCoordinatorRequest, MetadataRequest, MetadataResponse},
    topic::{self, Partition, PartitionMap, Topic},
    topic_registry::TopicRegistry,
};

/// Broker id given to seed brokers, whose real id is not known yet.
const SEED_BROKER_ID: i32 = -1;

type SharedRefresh = Shared<BoxFuture<'static, Result<()>>>;

/// Shared handle to one cluster. Clones refer to the same state.
#[derive(Clone, Debug)]
pub struct Cluster {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClusterConfig,
    settings: ConnectionSettings,
    hosts: Arc<dyn HostsProvider>,
    state: RwLock<ClusterState>,
    in_flight: Mutex<Option<InFlight>>,
    refresh_ids: AtomicU64,
    correlation_id: AtomicI32,
    metadata_requests: AtomicUsize,
    closed: AtomicBool,
}

#[derive(Debug)]
struct ClusterState {
    brokers: BrokerRegistry,
    topics: TopicRegistry,
}

struct InFlight {
    id: u64,
    /// `None` for a full refresh.
    scope: Option<Vec<String>>,
    refresh: SharedRefresh,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A metadata response, decoded and validated, ready to be applied.
#[derive(Debug)]
struct Snapshot {
    brokers: Vec<(i32, BrokerAddress)>,
    topics: Vec<(String, TopicState)>,
}

#[derive(Debug)]
enum TopicState {
    Present(PartitionMap),
    /// The cluster does not know the topic.
    Missing,
    /// The topic exists but its metadata is unusable right now, for
    /// instance while a leader election runs.
    Unavailable(KafkaCode),
}

impl TryFrom<MetadataResponse> for Snapshot {
    type Error = Error;

    fn try_from(response: MetadataResponse) -> Result<Self> {
        if response.brokers.is_empty() {
            tracing::warn!("Metadata response listed no brokers");
            return Err(Error::KafkaError(KafkaCode::BrokerNotAvailable));
        }
        let brokers = response
            .brokers
            .iter()
            .map(|broker| Ok((broker.node_id, broker.addr()?)))
            .collect::<Result<Vec<_>>>()?;

        let topics = response
            .topics
            .iter()
            .map(|topic| {
                let name = to_str(&topic.name)?.to_owned();
                let state = match topic.error_code {
                    KafkaCode::None => TopicState::Present(
                        topic
                            .partitions
                            .iter()
                            .map(|p| (p.partition_index, Partition::from(p)))
                            .collect(),
                    ),
                    KafkaCode::UnknownTopicOrPartition | KafkaCode::InvalidTopic => {
                        TopicState::Missing
                    }
                    code => TopicState::Unavailable(code),
                };
                Ok((name, state))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Snapshot { brokers, topics })
    }
}

impl Cluster {
    /// Create a cluster and bootstrap it with a full metadata refresh.
    ///
    /// Fails with [`Error::ClusterUnreachable`] when no seed broker answers.
    #[instrument(name = "cluster-bootstrap", level = "debug", skip(hosts))]
    pub async fn bootstrap(config: ClusterConfig, hosts: Arc<dyn HostsProvider>) -> Result<Self> {
        let cluster = Self::new(config, hosts);
        tracing::info!("Bootstrapping cluster from {:?}", cluster.inner.hosts);
        cluster.update(None).await?;
        Ok(cluster)
    }

    /// Create a cluster without contacting it. Topology is fetched on
    /// first use.
    pub fn new(config: ClusterConfig, hosts: Arc<dyn HostsProvider>) -> Self {
        let settings = config.connection_settings();
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ClusterState {
                    brokers: BrokerRegistry::new(settings.clone()),
                    topics: TopicRegistry::new(),
                }),
                config,
                settings,
                hosts,
                in_flight: Mutex::new(None),
                refresh_ids: AtomicU64::new(0),
                correlation_id: AtomicI32::new(1),
                metadata_requests: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    /// Correlation id for the next request sent on behalf of this cluster.
    pub fn next_correlation_id(&self) -> i32 {
        self.inner.correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Metadata requests sent so far, failed ones included.
    pub fn metadata_requests(&self) -> usize {
        self.inner.metadata_requests.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClusterClosed);
        }
        Ok(())
    }

    /// Refresh topology for `topics`, or for the whole cluster when
    /// `None` or empty.
    ///
    /// If a refresh already in flight covers the requested topics, this
    /// waits for it and returns its outcome instead of sending another
    /// request. Otherwise it waits for the running one to finish and then
    /// starts its own.
    ///
    /// On failure the previous topology is left in place.
    #[instrument(name = "cluster-update", level = "debug", skip(self))]
    pub async fn update(&self, topics: Option<Vec<String>>) -> Result<()> {
        self.ensure_open()?;
        let scope = topics
            .map(|mut topics| {
                topics.sort_unstable();
                topics.dedup();
                topics
            })
            .filter(|topics| !topics.is_empty());

        loop {
            let (refresh, covered) = {
                let mut in_flight = self.inner.in_flight.lock();
                match in_flight.as_ref() {
                    Some(flight) => (flight.refresh.clone(), covers(&flight.scope, &scope)),
                    None => {
                        let flight = self.start_refresh(scope.clone());
                        let refresh = flight.refresh.clone();
                        *in_flight = Some(flight);
                        (refresh, true)
                    }
                }
            };

            let outcome = refresh.await;
            if covered {
                return outcome;
            }
            tracing::debug!("Waited on a narrower refresh, starting another");
            self.ensure_open()?;
        }
    }

    /// Spawn the refresh task. Must be called with the in-flight guard
    /// held so the task cannot clear it before it is set.
    fn start_refresh(&self, scope: Option<Vec<String>>) -> InFlight {
        let id = self.inner.refresh_ids.fetch_add(1, Ordering::Relaxed);
        let cluster = self.clone();
        let task_scope = scope.clone();
        let handle = tokio::spawn(async move {
            let outcome = cluster.refresh(task_scope).await;
            let mut in_flight = cluster.inner.in_flight.lock();
            if in_flight.as_ref().is_some_and(|flight| flight.id == id) {
                *in_flight = None;
            }
            outcome
        });

        let refresh = async move {
            handle.await.unwrap_or_else(|err| {
                tracing::error!("ERROR: Metadata refresh task failed {:?}", err);
                Err(Error::IoError(io::ErrorKind::Interrupted))
            })
        }
        .boxed()
        .shared();

        InFlight { id, scope, refresh }
    }

    #[instrument(name = "cluster-refresh", level = "debug", skip(self))]
    async fn refresh(&self, scope: Option<Vec<String>>) -> Result<()> {
        let snapshot = self.fetch_metadata(scope.as_deref()).await?;
        self.apply(scope.as_deref(), snapshot)
    }

    /// Ask known brokers for metadata, live ones first, then fall back to
    /// the seed hosts.
    async fn fetch_metadata(&self, scope: Option<&[String]>) -> Result<Snapshot> {
        let topics = scope.unwrap_or(&[]);
        let candidates = self.inner.state.read().brokers.candidates();

        let mut propagated_err = None;
        for broker in candidates {
            match self.request_metadata(&broker, topics).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => {
                    tracing::warn!("Metadata request to broker {} failed: {}", broker.id(), err);
                    propagated_err = Some(err);
                }
            }
        }

        match self.inner.hosts.hosts().await {
            Ok(seeds) => {
                for addr in seeds {
                    let broker = Broker::new(SEED_BROKER_ID, addr, self.inner.settings.clone());
                    let result = self.request_metadata(&broker, topics).await;
                    broker.close().await;
                    match result {
                        Ok(snapshot) => return Ok(snapshot),
                        Err(err) => {
                            tracing::warn!(
                                "Metadata request to seed {} failed: {}",
                                broker.addr(),
                                err
                            );
                            propagated_err = Some(err);
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Could not resolve seed hosts: {}", err);
                propagated_err = Some(err);
            }
        }

        let cause = propagated_err
            .unwrap_or_else(|| Error::ArgError(String::from("no brokers or seed hosts to ask")));
        tracing::error!("ERROR: Cluster unreachable: {}", cause);
        Err(Error::ClusterUnreachable {
            cause: Box::new(cause),
        })
    }

    async fn request_metadata(&self, broker: &Broker, topics: &[String]) -> Result<Snapshot> {
        let req = MetadataRequest::new(self.next_correlation_id(), self.client_id(), topics);
        self.inner.metadata_requests.fetch_add(1, Ordering::Relaxed);
        let response = broker.send(&req).await?;
        Snapshot::try_from(response)
    }

    /// Publish a snapshot. Both registries change under one write lock so
    /// readers see all of it or none of it.
    fn apply(&self, scope: Option<&[String]>, snapshot: Snapshot) -> Result<()> {
        let removed = {
            let mut state = self.inner.state.write();
            // close() sets the flag before clearing state under this lock; a
            // refresh finishing after it must not bring any back
            self.ensure_open()?;
            let generation = state.topics.next_generation();
            // entries from the previous refresh get a grace period so a
            // lookup racing this refresh still finds them
            state
                .topics
                .evict_unreferenced_before(generation.saturating_sub(1));

            let removed = state.brokers.reconcile(&snapshot.brokers);

            let mut present = BTreeSet::new();
            for (name, topic_state) in snapshot.topics {
                match topic_state {
                    TopicState::Present(partitions) => {
                        state.topics.update(&name, partitions);
                        present.insert(name);
                    }
                    TopicState::Missing => {
                        tracing::debug!("Cluster does not know topic {}", name);
                        state.topics.remove(&name);
                    }
                    TopicState::Unavailable(code) => {
                        tracing::warn!("Topic {} unavailable: {:?}", name, code);
                        state.topics.mark_unavailable(&name, code);
                        present.insert(name);
                    }
                }
            }
            if scope.is_none() {
                state.topics.retain_known(&present);
            }
            removed
        };

        for broker in removed {
            broker.retire();
        }
        Ok(())
    }

    /// The broker currently leading `topic`/`partition`.
    ///
    /// When the topic or partition is unknown, the topic is stale, or the
    /// leader is not registered, this refreshes the topic once and looks
    /// again. Still missing after that is [`Error::PartitionNotFound`], or
    /// the topic-level [`Error::KafkaError`] the refresh reported.
    #[instrument(name = "cluster-leader-for", level = "debug", skip(self))]
    pub async fn leader_for(&self, topic: &str, partition: i32) -> Result<Arc<Broker>> {
        self.ensure_open()?;
        match self.lookup_leader(topic, partition) {
            Ok(broker) => return Ok(broker),
            Err(err) => tracing::debug!("Leader lookup missed ({}), refreshing", err),
        }

        self.update(Some(vec![topic.to_owned()])).await?;
        self.lookup_leader(topic, partition).map_err(|err| {
            tracing::warn!("No leader for {} {} after refresh: {}", topic, partition, err);
            match self.inner.state.read().topics.unavailable(topic) {
                Some(code) => Error::KafkaError(code),
                None => Error::PartitionNotFound {
                    topic: topic.to_owned(),
                    partition,
                },
            }
        })
    }

    fn lookup_leader(&self, topic: &str, partition: i32) -> Result<Arc<Broker>> {
        let state = self.inner.state.read();
        let cached = state
            .topics
            .get(topic)
            .filter(|cached| !cached.is_stale())
            .ok_or_else(|| Error::TopicNotFound(topic.to_owned()))?;
        let leader = cached
            .leader(partition)
            .ok_or_else(|| Error::PartitionNotFound {
                topic: topic.to_owned(),
                partition,
            })?;
        state.brokers.get(leader)
    }

    /// Run `op` against the leader of `topic`/`partition`, refreshing and
    /// retrying on errors that mean the topology was out of date.
    ///
    /// Attempts and backoff come from the configured
    /// [`RetryPolicy`](crate::config::RetryPolicy). Once attempts run out
    /// the last error is returned. `op` should surface leadership errors
    /// found inside a response as [`Error::KafkaError`] so they are
    /// retried too.
    pub async fn with_leader_retry<T, F, Fut>(
        &self,
        topic: &str,
        partition: i32,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(Arc<Broker>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = &self.inner.config.retry;
        let attempts = retry.attempts();
        let mut attempt = 1;
        loop {
            let result = match self.leader_for(topic, partition).await {
                Ok(broker) => op(broker).await,
                Err(err) => Err(err),
            };
            match result {
                Err(err) if err.needs_refresh() && attempt < attempts => {
                    tracing::warn!(
                        "Attempt {}/{} on {} {} failed: {}",
                        attempt,
                        attempts,
                        topic,
                        partition,
                        err
                    );
                    // the next leader lookup refreshes a stale topic
                    self.mark_stale(topic);
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Send a request to the leader of `topic`/`partition` with
    /// [`with_leader_retry`](Self::with_leader_retry).
    pub async fn send_to_leader<R: crate::protocol::Request>(
        &self,
        topic: &str,
        partition: i32,
        req: &R,
    ) -> Result<R::Response> {
        self.with_leader_retry(topic, partition, |broker| async move { broker.send(req).await })
            .await
    }

    /// The broker coordinating `group_id`, found with a FindCoordinator
    /// request on the offsets channel.
    #[instrument(name = "cluster-group-coordinator", level = "debug", skip(self))]
    pub async fn group_coordinator(&self, group_id: &str) -> Result<Arc<Broker>> {
        let retry = &self.inner.config.retry;
        let attempts = retry.attempts();
        let mut attempt = 1;
        loop {
            self.ensure_open()?;
            match self.find_coordinator(group_id).await {
                Err(err) if err.needs_refresh() && attempt < attempts => {
                    tracing::warn!(
                        "Attempt {}/{} to find coordinator for {} failed: {}",
                        attempt,
                        attempts,
                        group_id,
                        err
                    );
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                    self.update(None).await?;
                }
                result => return result,
            }
        }
    }

    async fn find_coordinator(&self, group_id: &str) -> Result<Arc<Broker>> {
        let candidates = self.inner.state.read().brokers.candidates();

        let mut propagated_err = Error::ClusterUnreachable {
            cause: Box::new(Error::ArgError(String::from("no known brokers"))),
        };
        for broker in candidates {
            let req =
                FindCoordinatorRequest::new(self.next_correlation_id(), self.client_id(), group_id);
            let response = match broker.send_offsets(&req).await {
                Ok(response) => response,
                Err(err) if err.needs_refresh() => {
                    tracing::debug!("Broker {} could not find coordinator: {}", broker.id(), err);
                    propagated_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            };
            response.is_error()?;

            let coordinator = response.node_id;
            if let Ok(broker) = self.broker(coordinator) {
                return Ok(broker);
            }
            tracing::debug!("Coordinator {} is not registered, refreshing", coordinator);
            self.update(None).await?;
            return self.broker(coordinator);
        }
        Err(propagated_err)
    }

    /// Handle to `name`, fetching its metadata if it is not cached, stale,
    /// or held by nobody.
    ///
    /// While the caller holds the returned handle, refreshes keep its
    /// partitions current. Fails with [`Error::TopicNotFound`] when the
    /// cluster does not know the topic, or with the reported
    /// [`Error::KafkaError`] when it knows it but could not describe it.
    pub async fn topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.ensure_open()?;
        let live = self.inner.state.read().topics.get_live(name);
        if let Some(topic) = live {
            return Ok(topic);
        }
        tracing::debug!("Fetching metadata for topic {}", name);
        self.update(Some(vec![name.to_owned()])).await?;
        let state = self.inner.state.read();
        state
            .topics
            .get(name)
            .ok_or_else(|| match state.topics.unavailable(name) {
                Some(code) => Error::KafkaError(code),
                None => Error::TopicNotFound(name.to_owned()),
            })
    }

    /// Handles to every topic in the cluster, honoring
    /// `exclude_internal_topics`. Topics not cached are fetched with one
    /// scoped refresh.
    pub async fn topics(&self) -> Result<Vec<Arc<Topic>>> {
        self.ensure_open()?;
        let names = self.topic_names();
        let missing: Vec<String> = {
            let state = self.inner.state.read();
            names
                .iter()
                .filter(|name| state.topics.get(name).map_or(true, |t| t.is_stale()))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            self.update(Some(missing)).await?;
        }

        let state = self.inner.state.read();
        Ok(names
            .iter()
            .filter_map(|name| state.topics.get(name))
            .collect())
    }

    /// Names of every topic the cluster reported, sorted, honoring
    /// `exclude_internal_topics`.
    pub fn topic_names(&self) -> Vec<String> {
        let exclude_internal = self.inner.config.exclude_internal_topics;
        self.inner
            .state
            .read()
            .topics
            .names()
            .filter(|name| !(exclude_internal && topic::is_internal(name)))
            .map(str::to_owned)
            .collect()
    }

    /// Flag a topic for refresh on its next leader lookup.
    pub fn mark_stale(&self, topic: &str) {
        self.inner.state.read().topics.mark_stale(topic);
    }

    /// Drop cached topics no caller holds. Returns their names.
    pub fn evict_unreferenced(&self) -> Vec<String> {
        self.inner.state.write().topics.evict_unreferenced()
    }

    /// Whether `name` is currently cached.
    pub fn is_cached(&self, name: &str) -> bool {
        self.inner.state.read().topics.contains(name)
    }

    /// Registered brokers, by id.
    pub fn brokers(&self) -> Vec<Arc<Broker>> {
        let mut brokers: Vec<Arc<Broker>> =
            self.inner.state.read().brokers.iter().cloned().collect();
        brokers.sort_by_key(|broker| broker.id());
        brokers
    }

    pub fn broker(&self, broker_id: i32) -> Result<Arc<Broker>> {
        self.ensure_open()?;
        self.inner.state.read().brokers.get(broker_id)
    }

    /// Close every broker connection and clear both registries. Every
    /// call after this fails with [`Error::ClusterClosed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let brokers = {
            let mut state = self.inner.state.write();
            state.topics.clear();
            state.brokers.clear()
        };
        for broker in brokers.iter() {
            broker.retire();
        }
        for broker in brokers.iter() {
            broker.close().await;
        }
        tracing::info!("Closed cluster");
    }
}

/// Whether a refresh over `running` also answers a request for `wanted`.
fn covers(running: &Option<Vec<String>>, wanted: &Option<Vec<String>>) -> bool {
    match (running, wanted) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(running), Some(wanted)) => wanted.iter().all(|topic| running.contains(topic)),
    }
}
