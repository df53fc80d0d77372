//! Connection & communication with a broker.
//!
//! # Network Module
//!
//! Kafka uses a binary protocol over TCP. The protocol defines all APIs as
//! request response message pairs. All messages are size delimited.
//!
//! The client initiates a socket connection and then writes a sequence of
//! request messages and reads back the corresponding response message. No
//! handshake is required on connection or disconnection. TCP is happier if
//! you maintain persistent connections used for many requests to amortize
//! the cost of the TCP handshake, so connections are kept open and reused
//! until they fail.
//!
//! The server guarantees that on a single TCP connection, requests will
//! be processed in the order they are sent and responses will return in
//! that order as well. We do not pipeline: a [`Connection`] carries at
//! most one outstanding request, which keeps correlation trivial and
//! leaves backpressure at the socket.

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

pub mod tcp;

pub use tcp::Connection;

pub const DEFAULT_PORT: u16 = 9092;

/// Host and port of a broker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddress {
    type Err = Error;

    /// Parses `host:port`, or a bare `host` on the default port.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|err| {
                    tracing::error!("Error could not parse port from {} {:?}", s, err);
                    Error::ArgError(format!("invalid broker address {s}"))
                })?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(Error::ArgError(format!("invalid broker address {s}")));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_address() {
        assert_eq!(
            "kafka-1:9093".parse::<BrokerAddress>().unwrap(),
            BrokerAddress::new("kafka-1", 9093)
        );
        assert_eq!(
            " localhost ".parse::<BrokerAddress>().unwrap(),
            BrokerAddress::new("localhost", DEFAULT_PORT)
        );
        assert!("localhost:port".parse::<BrokerAddress>().is_err());
        assert!(":9092".parse::<BrokerAddress>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let addr = BrokerAddress::new("127.0.0.1", 9092);
        assert_eq!(addr.to_string().parse::<BrokerAddress>().unwrap(), addr);
    }
}
