use serde_derive::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    network::BrokerAddress,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct NodeConfig {
    pub node_id: i32,
    #[serde(default)]
    pub advertised_kafka_api: Vec<KafkaListener>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KafkaListener {
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub port: i32,
}

impl NodeConfig {
    pub fn kafka_addresses(&self) -> Result<Vec<BrokerAddress>> {
        self.advertised_kafka_api
            .iter()
            .map(|listener| {
                let port = u16::try_from(listener.port).map_err(|_| {
                    Error::ArgError(format!("invalid port {} for {}", listener.port, listener.address))
                })?;
                Ok(BrokerAddress::new(listener.address.clone(), port))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn advertised_listeners() {
        let config: NodeConfig = serde_json::from_str(
            r#"{
                "node_id": 2,
                "advertised_kafka_api": [
                    {"name": "internal", "address": "redpanda-2", "port": 9092},
                    {"name": "external", "address": "localhost", "port": 19092}
                ],
                "rack": null
            }"#,
        )
        .unwrap();
        assert_eq!(config.node_id, 2);
        assert_eq!(
            config.kafka_addresses().unwrap(),
            vec![
                BrokerAddress::new("redpanda-2", 9092),
                BrokerAddress::new("localhost", 19092)
            ]
        );
    }

    #[test]
    fn rejects_bad_port() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"node_id": 1, "advertised_kafka_api": [{"address": "a", "port": -1}]}"#)
                .unwrap();
        assert!(config.kafka_addresses().is_err());
    }
}
