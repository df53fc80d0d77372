use std::{net::SocketAddr, sync::Arc};

use crate::{
    cluster::Cluster,
    config::{ClusterConfig, RetryPolicy},
    error::Result,
    hosts::{HostsProvider, StaticHosts},
};

/// Configure a [`Cluster`].
///
/// ### Example
/// ```rust,no_run
/// # async fn run() -> gregor::prelude::Result<()> {
/// let mut builder = gregor::prelude::ClusterBuilder::from_hosts("127.0.0.1:9092")?;
/// builder.socket_timeout_ms(5_000).exclude_internal_topics(false);
/// let cluster = builder.build().await?;
///
/// let leader = cluster.leader_for("my-topic", 0).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ClusterBuilder {
    hosts: Arc<dyn HostsProvider>,
    config: ClusterConfig,
}

impl ClusterBuilder {
    /// Start from any seed host provider.
    pub fn new(hosts: Arc<dyn HostsProvider>) -> Self {
        Self {
            hosts,
            config: ClusterConfig::default(),
        }
    }

    /// Start from a comma separated `host:port` list.
    pub fn from_hosts(hosts: &str) -> Result<Self> {
        Ok(Self::new(Arc::new(StaticHosts::parse(hosts)?)))
    }

    /// Replace every option at once, for instance with a config loaded
    /// from a file.
    pub fn config(&mut self, config: ClusterConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Timeout for connecting and for each request, in milliseconds.
    pub fn socket_timeout_ms(&mut self, socket_timeout_ms: u64) -> &mut Self {
        self.config.socket_timeout_ms = socket_timeout_ms;
        self
    }

    /// Timeout for offset commit and fetch traffic, in milliseconds.
    pub fn offsets_channel_socket_timeout_ms(&mut self, timeout_ms: u64) -> &mut Self {
        self.config.offsets_channel_socket_timeout_ms = timeout_ms;
        self
    }

    pub fn exclude_internal_topics(&mut self, exclude: bool) -> &mut Self {
        self.config.exclude_internal_topics = exclude;
        self
    }

    /// Local address to bind outgoing connections to.
    pub fn source_address(&mut self, source_address: SocketAddr) -> &mut Self {
        self.config.source_address = Some(source_address);
        self
    }

    pub fn client_id(&mut self, client_id: impl Into<String>) -> &mut Self {
        self.config.client_id = client_id.into();
        self
    }

    /// How many times a request is attempted when the topology turns out
    /// to be stale, and how long to wait between attempts.
    pub fn retry(&mut self, max_attempts: usize, backoff_ms: u64) -> &mut Self {
        self.config.retry = RetryPolicy {
            max_attempts,
            backoff_ms,
        };
        self
    }

    /// Bootstrap the cluster.
    pub async fn build(self) -> Result<Cluster> {
        Cluster::bootstrap(self.config, self.hosts).await
    }
}
