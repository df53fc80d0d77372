use bytes::{BufMut, Bytes, BytesMut};
use criterion::*;
use gregor::prelude::protocol::MetadataResponse;

const BROKERS: i32 = 5;
const TOPICS: i32 = 200;
const PARTITIONS: i32 = 12;

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i16(s.len() as i16);
    buf.put_slice(s.as_bytes());
}

/// A metadata v0 response for a mid sized cluster.
fn metadata_response() -> Bytes {
    let mut buf = BytesMut::new();
    // correlation id
    buf.put_i32(1);

    buf.put_i32(BROKERS);
    for node_id in 0..BROKERS {
        buf.put_i32(node_id);
        put_string(&mut buf, &format!("kafka-{node_id}.internal"));
        buf.put_i32(9092);
    }

    buf.put_i32(TOPICS);
    for topic in 0..TOPICS {
        buf.put_i16(0);
        put_string(&mut buf, &format!("price-updates-{topic}"));
        buf.put_i32(PARTITIONS);
        for partition in 0..PARTITIONS {
            let leader = (topic + partition) % BROKERS;
            let replicas = [leader, (leader + 1) % BROKERS, (leader + 2) % BROKERS];
            buf.put_i16(0);
            buf.put_i32(partition);
            buf.put_i32(leader);
            for nodes in [&replicas[..], &replicas[..2]] {
                buf.put_i32(nodes.len() as i32);
                for node in nodes {
                    buf.put_i32(*node);
                }
            }
        }
    }
    buf.freeze()
}

fn criterion_benchmark(c: &mut Criterion) {
    let data = metadata_response();

    let mut parser_group = c.benchmark_group("parser");

    parser_group.throughput(Throughput::Bytes(data.len() as u64));
    parser_group.bench_with_input(
        BenchmarkId::new("metadata", data.len()),
        &data,
        |b, data: &Bytes| {
            b.iter(|| {
                let response = MetadataResponse::try_from(black_box(data.clone())).unwrap();
                assert_eq!(response.topics.len(), TOPICS as usize);
            })
        },
    );
    parser_group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
