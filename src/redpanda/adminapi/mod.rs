//! Bootstrap from the Redpanda admin API.
mod builder;
mod node_config;

use async_trait::async_trait;
use tracing::instrument;

pub use builder::Builder;
pub use node_config::{KafkaListener, NodeConfig};

use crate::{
    error::{Error, Result},
    hosts::HostsProvider,
    network::BrokerAddress,
};

/// Finds seed brokers by asking Redpanda admin endpoints for their
/// advertised Kafka listeners.
///
/// URLs are tried in order; the first node that answers supplies the
/// hosts. The cluster only needs one reachable broker to learn the rest
/// through metadata.
#[derive(Clone, Debug)]
pub struct AdminApiHosts {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl AdminApiHosts {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    #[instrument(name = "adminapi-node-config", level = "debug", skip(self))]
    pub async fn node_config(&self, url: &str) -> Result<NodeConfig> {
        let url = format!("{}/v1/node_config", url.trim_end_matches('/'));
        let config: NodeConfig = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(config)
    }
}

#[async_trait]
impl HostsProvider for AdminApiHosts {
    async fn hosts(&self) -> Result<Vec<BrokerAddress>> {
        let mut propagated_err = Error::ArgError(String::from("no admin api urls given"));
        for url in self.urls.iter() {
            match self.node_config(url).await {
                Ok(config) => {
                    let hosts = config.kafka_addresses()?;
                    if hosts.is_empty() {
                        tracing::warn!("Node {} advertises no kafka listeners", config.node_id);
                        continue;
                    }
                    tracing::debug!("Admin api at {} advertised {:?}", url, hosts);
                    return Ok(hosts);
                }
                Err(err) => {
                    tracing::warn!("Could not reach admin api at {}: {}", url, err);
                    propagated_err = err;
                }
            }
        }
        Err(propagated_err)
    }
}
