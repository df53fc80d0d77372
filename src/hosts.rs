//! Where the cluster finds its first brokers.
use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    network::BrokerAddress,
};

/// Produces the ordered list of seed brokers to bootstrap from.
///
/// Asked again whenever every known broker is unreachable, so dynamic
/// providers can return a different list each time.
#[async_trait]
pub trait HostsProvider: std::fmt::Debug + Send + Sync {
    async fn hosts(&self) -> Result<Vec<BrokerAddress>>;
}

/// A fixed list of `host:port` addresses.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticHosts {
    hosts: Vec<BrokerAddress>,
}

impl StaticHosts {
    pub fn new(hosts: Vec<BrokerAddress>) -> Result<Self> {
        if hosts.is_empty() {
            return Err(Error::ArgError(String::from("no bootstrap hosts given")));
        }
        Ok(Self { hosts })
    }

    /// Parse a comma separated list such as `kafka-1:9092, kafka-2`.
    pub fn parse(list: &str) -> Result<Self> {
        let hosts = list
            .split(',')
            .filter(|host| !host.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<BrokerAddress>>>()?;
        Self::new(hosts)
    }

    pub fn from_strings<S: AsRef<str>>(list: &[S]) -> Result<Self> {
        let hosts = list
            .iter()
            .map(|host| host.as_ref().parse())
            .collect::<Result<Vec<BrokerAddress>>>()?;
        Self::new(hosts)
    }
}

#[async_trait]
impl HostsProvider for StaticHosts {
    async fn hosts(&self) -> Result<Vec<BrokerAddress>> {
        Ok(self.hosts.clone())
    }
}
