//! # Gregor
//! Rust-native Kafka/Redpanda cluster metadata and broker connection management.
//!
//! This crate is the piece of a Kafka client that everything else stands
//! on: it discovers brokers, tracks which broker leads which partition,
//! keeps connections to each broker, and refreshes its picture of the
//! cluster when brokers fail over, partitions move, or topics appear.
//! Producers and consumers ask it for the leader of a topic partition
//! and send their requests through the returned broker handle.
//!
//! ## Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as Tokio, Nom to do the heavy lifting
//! - Safe to share between many concurrent tasks
//! - Never stall unrelated lookups behind one slow broker
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//!     - [Client](#client)
//!     - [Cluster](#cluster)
//!     - [Retrying against the leader](#retrying-against-the-leader)
//! - [Resources](#resources)
//!
//! ## Getting started
//! Include the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! gregor = "0.1"
//! ```
//!
//! The `redpanda` feature adds a bootstrap provider that discovers seed
//! brokers through the Redpanda admin API. The `serde` feature makes
//! [`ClusterConfig`](prelude::ClusterConfig) deserializable.
//!
//! ### Client
//! A [`KafkaClient`](prelude::KafkaClient) bootstraps from a comma separated
//! seed list and exposes brokers and topics.
//! ```rust,no_run
//! # async fn run() -> gregor::prelude::Result<()> {
//! let client = gregor::prelude::KafkaClient::new("127.0.0.1:9092").await?;
//!
//! for name in client.topic_names() {
//!     let topic = client.topic(&name).await?;
//!     println!("{} has partitions {:?}", name, topic.partition_ids());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Cluster
//! A [`Cluster`](prelude::Cluster) is the shared coordinator. Clone it into
//! as many tasks as needed. To configure one, start with a
//! [`ClusterBuilder`](prelude::ClusterBuilder).
//! ```rust,no_run
//! # async fn run() -> gregor::prelude::Result<()> {
//! let mut builder = gregor::prelude::ClusterBuilder::from_hosts("127.0.0.1:9092")?;
//! builder.socket_timeout_ms(10_000).client_id("my-app");
//! let cluster = builder.build().await?;
//!
//! let leader = cluster.leader_for("my-topic", 0).await?;
//! println!("partition 0 is led by broker {}", leader.id());
//! # Ok(())
//! # }
//! ```
//!
//! ### Retrying against the leader
//! Leaders move. [`Cluster::send_to_leader`](prelude::Cluster::send_to_leader)
//! looks up the leader, sends, and on a stale topology error refreshes and
//! tries again, a bounded number of times.
//! ```rust,no_run
//! # async fn run(cluster: gregor::prelude::Cluster) -> gregor::prelude::Result<()> {
//! use gregor::prelude::protocol::MetadataRequest;
//!
//! let topics = ["my-topic"];
//! let req = MetadataRequest::new(cluster.next_correlation_id(), cluster.client_id(), &topics);
//! let response = cluster.send_to_leader("my-topic", 0, &req).await?;
//! println!("{:?}", response.brokers);
//! # Ok(())
//! # }
//! ```
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

mod broker;
mod broker_registry;
mod client;
mod cluster;
mod cluster_builder;
mod config;
mod encode;
mod error;
mod hosts;
mod network;
mod parser;
mod protocol;
mod topic;
mod topic_registry;

const DEFAULT_CLIENT_ID: &str = "gregor";

#[cfg(feature = "redpanda")]
pub mod redpanda {
    //! Redpanda specific integrations.
    pub mod adminapi;
}

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! # Cluster
    //!
    //! [`Cluster`] owns a [`BrokerRegistry`] and a [`TopicRegistry`] and
    //! keeps both in step with the brokers' metadata. The registries are
    //! exported for callers that want to inspect or drive them directly.
    //!
    //! # Brokers & connections
    //!
    //! A [`Broker`] is a stable handle to one broker. It holds a general
    //! connection and a separate one for offset traffic, both opened lazily.
    //! [`Connection`] is the raw size delimited request/response socket
    //! underneath, for those who want to get their hands dirty.
    //!
    //! # Protocol
    //!
    //! The request and response types spoken by this crate live in the
    //! [protocol module](protocol). Any type implementing
    //! [`Request`](protocol::Request) can be sent through a [`Broker`].
    pub use crate::broker::{Broker, Channel, ConnectionSettings};
    pub use crate::broker_registry::BrokerRegistry;
    pub use crate::client::KafkaClient;
    pub use crate::cluster::Cluster;
    pub use crate::cluster_builder::ClusterBuilder;
    pub use crate::config::{ClusterConfig, RetryPolicy};
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::hosts::{HostsProvider, StaticHosts};
    pub use crate::network::{BrokerAddress, Connection, DEFAULT_PORT};
    pub use crate::topic::{Partition, PartitionMap, Topic};
    pub use crate::topic_registry::TopicRegistry;

    #[cfg(feature = "redpanda")]
    pub use crate::redpanda;

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}
