use std::env;

use gregor::prelude::{ClusterBuilder, Error};

const KAFKA_BROKERS: &str = "KAFKA_BROKERS";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        // filter spans/events with level INFO or higher.
        .with_max_level(tracing::Level::INFO)
        .compact()
        // Display source code file paths
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Don't display the event's target (module path)
        .with_target(false)
        // Build the subscriber
        .init();

    let hosts = env::var(KAFKA_BROKERS).unwrap_or_else(|_| String::from("127.0.0.1:9092"));
    let mut builder = ClusterBuilder::from_hosts(&hosts)?;
    builder.exclude_internal_topics(false);
    let cluster = builder.build().await.map_err(|err| {
        tracing::error!("Could not bootstrap from {}: {}", hosts, err);
        err
    })?;

    for broker in cluster.brokers() {
        println!("broker {} at {}", broker.id(), broker.addr());
    }

    for topic in cluster.topics().await? {
        println!("topic {}", topic.name());
        for (id, partition) in sorted(topic.partitions().iter()) {
            let leader = partition
                .leader
                .map_or_else(|| String::from("none"), |leader| leader.to_string());
            println!(
                "  partition {} leader {} replicas {:?} isr {:?}",
                id, leader, partition.replicas, partition.isr
            );
        }
    }

    cluster.close().await;
    Ok(())
}

fn sorted<'a, T>(items: impl Iterator<Item = (&'a i32, &'a T)>) -> Vec<(&'a i32, &'a T)> {
    let mut items: Vec<_> = items.collect();
    items.sort_by_key(|(id, _)| **id);
    items
}
