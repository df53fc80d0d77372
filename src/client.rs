use std::sync::Arc;

use crate::{
    broker::Broker,
    cluster::Cluster,
    config::ClusterConfig,
    error::Result,
    hosts::{HostsProvider, StaticHosts},
    topic::Topic,
};

/// Entry point for applications: a bootstrapped [`Cluster`] plus the
/// handful of calls most callers need.
///
/// ### Example
/// ```rust,no_run
/// # async fn run() -> gregor::prelude::Result<()> {
/// let client = gregor::prelude::KafkaClient::new("127.0.0.1:9092,127.0.0.1:9093").await?;
///
/// for broker in client.brokers() {
///     println!("{} at {}", broker.id(), broker.addr());
/// }
/// let topic = client.topic("my-topic").await?;
/// println!("{:?}", topic.partition_ids());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KafkaClient {
    cluster: Cluster,
}

impl KafkaClient {
    /// Connect with default settings to the comma separated seed `hosts`.
    pub async fn new(hosts: &str) -> Result<Self> {
        Self::with_config(hosts, ClusterConfig::default()).await
    }

    pub async fn with_config(hosts: &str, config: ClusterConfig) -> Result<Self> {
        Self::with_provider(Arc::new(StaticHosts::parse(hosts)?), config).await
    }

    pub async fn with_provider(
        hosts: Arc<dyn HostsProvider>,
        config: ClusterConfig,
    ) -> Result<Self> {
        let cluster = Cluster::bootstrap(config, hosts).await?;
        Ok(Self { cluster })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn brokers(&self) -> Vec<Arc<Broker>> {
        self.cluster.brokers()
    }

    pub async fn topics(&self) -> Result<Vec<Arc<Topic>>> {
        self.cluster.topics().await
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.cluster.topic_names()
    }

    pub async fn topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.cluster.topic(name).await
    }

    /// Full metadata refresh.
    pub async fn update_cluster(&self) -> Result<()> {
        self.cluster.update(None).await
    }

    pub async fn close(&self) {
        self.cluster.close().await
    }
}
