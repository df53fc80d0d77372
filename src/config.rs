//! Cluster configuration.
use std::{net::SocketAddr, time::Duration};

#[cfg(feature = "serde")]
use serde_derive::Deserialize;

use crate::{broker::ConnectionSettings, DEFAULT_CLIENT_ID};

pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_OFFSETS_CHANNEL_SOCKET_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Options recognized by a [`Cluster`](crate::cluster::Cluster).
///
/// With the `serde` feature this deserializes from any format serde
/// supports; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterConfig {
    /// Timeout for connecting and for each request on the general channel.
    pub socket_timeout_ms: u64,
    /// The same for offset commit/fetch traffic.
    pub offsets_channel_socket_timeout_ms: u64,
    /// Hide broker internal topics, such as `__consumer_offsets`, from
    /// topic listings.
    pub exclude_internal_topics: bool,
    /// Local address outgoing connections bind to.
    pub source_address: Option<SocketAddr>,
    pub client_id: String,
    pub retry: RetryPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            offsets_channel_socket_timeout_ms: DEFAULT_OFFSETS_CHANNEL_SOCKET_TIMEOUT_MS,
            exclude_internal_topics: true,
            source_address: None,
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClusterConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn offsets_channel_socket_timeout(&self) -> Duration {
        Duration::from_millis(self.offsets_channel_socket_timeout_ms)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            socket_timeout: self.socket_timeout(),
            offsets_channel_socket_timeout: self.offsets_channel_socket_timeout(),
            source_address: self.source_address,
        }
    }
}

/// Bounded retry with linear backoff for requests that hit stale
/// topology.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero behaves like one.
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: usize) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(retry as u64))
    }
}
