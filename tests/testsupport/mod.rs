use std::{
    collections::{BTreeMap, HashMap},
    env,
    sync::Arc,
    time::Duration,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gregor::prelude::{BrokerAddress, ClusterBuilder, Error};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::{JoinHandle, JoinSet},
};

const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
const KAFKA_TOPIC: &str = "KAFKA_TOPIC";

const API_KEY_METADATA: i16 = 3;
const API_KEY_FIND_COORDINATOR: i16 = 10;
const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;

#[allow(dead_code)]
pub fn get_brokers() -> Result<(bool, String), Error> {
    match env::var(KAFKA_BROKERS) {
        Ok(brokers) => Ok((false, brokers)),
        Err(_) => {
            tracing::warn!("Skipping test because no {} is set", KAFKA_BROKERS);
            Ok((true, String::new()))
        }
    }
}

#[allow(dead_code)]
pub fn get_brokers_and_topic() -> Result<(bool, String, String), Error> {
    let (skip, brokers) = get_brokers()?;
    if skip {
        return Ok((skip, String::new(), String::new()));
    }
    let topic = match env::var(KAFKA_TOPIC) {
        Ok(topic) => topic,
        Err(_) => {
            tracing::warn!("Skipping test because no {} is set", KAFKA_TOPIC);
            return Ok((true, String::new(), String::new()));
        }
    };
    Ok((false, brokers, topic))
}

/// A builder with short timeouts and backoff, suited to the mock.
#[allow(dead_code)]
pub fn builder(seeds: &str) -> ClusterBuilder {
    let mut builder = ClusterBuilder::from_hosts(seeds).unwrap();
    builder
        .socket_timeout_ms(500)
        .offsets_channel_socket_timeout_ms(500)
        .retry(3, 10);
    builder
}

/// A port nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[derive(Default)]
struct Script {
    ports: BTreeMap<i32, u16>,
    advertised: Vec<i32>,
    /// Partition leaders by partition index, -1 for none.
    topics: BTreeMap<String, Vec<i32>>,
    /// Topic-level error codes, reported with no partitions.
    topic_errors: BTreeMap<String, i16>,
    coordinator: i32,
    metadata_delay: Duration,
    silent: bool,
    metadata_requests: HashMap<i32, usize>,
    find_coordinator_requests: usize,
    connections: HashMap<i32, usize>,
}

/// In-process brokers answering Metadata and FindCoordinator v0 from a
/// script the test edits while the cluster runs.
pub struct MockCluster {
    script: Arc<Mutex<Script>>,
    nodes: Mutex<HashMap<i32, JoinHandle<()>>>,
}

#[allow(dead_code)]
impl MockCluster {
    /// Start nodes with the given ids, all advertised.
    pub async fn start(ids: &[i32]) -> Self {
        let mock = Self {
            script: Arc::new(Mutex::new(Script::default())),
            nodes: Mutex::new(HashMap::new()),
        };
        for id in ids {
            mock.start_node(*id).await;
        }
        mock.advertise(ids);
        mock.set_coordinator(ids[0]);
        mock
    }

    /// Start (or restart) one node. It is not advertised until
    /// [`advertise`](Self::advertise) says so.
    pub async fn start_node(&self, id: i32) -> BrokerAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        self.script.lock().ports.insert(id, port);

        let script = self.script.clone();
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            while let Ok((socket, _)) = listener.accept().await {
                *script.lock().connections.entry(id).or_default() += 1;
                connections.spawn(serve(socket, id, script.clone()));
            }
        });
        if let Some(previous) = self.nodes.lock().insert(id, handle) {
            previous.abort();
        }
        BrokerAddress::new("127.0.0.1", port)
    }

    /// Kill a node: its listener and every open connection go away.
    pub fn stop_node(&self, id: i32) {
        if let Some(handle) = self.nodes.lock().remove(&id) {
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        for (_, handle) in self.nodes.lock().drain() {
            handle.abort();
        }
    }

    /// The brokers listed in metadata responses.
    pub fn advertise(&self, ids: &[i32]) {
        self.script.lock().advertised = ids.to_vec();
    }

    /// Create or move a topic; partition `i` is led by `leaders[i]`.
    pub fn set_topic(&self, name: &str, leaders: &[i32]) {
        self.script
            .lock()
            .topics
            .insert(name.to_owned(), leaders.to_vec());
    }

    pub fn remove_topic(&self, name: &str) {
        self.script.lock().topics.remove(name);
    }

    /// Report `code` for `name` instead of its partitions until cleared.
    pub fn set_topic_error(&self, name: &str, code: i16) {
        self.script.lock().topic_errors.insert(name.to_owned(), code);
    }

    pub fn clear_topic_error(&self, name: &str) {
        self.script.lock().topic_errors.remove(name);
    }

    pub fn set_coordinator(&self, id: i32) {
        self.script.lock().coordinator = id;
    }

    pub fn set_metadata_delay(&self, delay: Duration) {
        self.script.lock().metadata_delay = delay;
    }

    /// Read requests but never answer them.
    pub fn set_silent(&self, silent: bool) {
        self.script.lock().silent = silent;
    }

    pub fn addr(&self, id: i32) -> BrokerAddress {
        BrokerAddress::new("127.0.0.1", self.script.lock().ports[&id])
    }

    /// Comma separated addresses of the given nodes.
    pub fn seeds_for(&self, ids: &[i32]) -> String {
        ids.iter()
            .map(|id| self.addr(*id).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma separated addresses of every advertised node.
    pub fn seeds(&self) -> String {
        let advertised = self.script.lock().advertised.clone();
        self.seeds_for(&advertised)
    }

    pub fn metadata_requests(&self) -> usize {
        self.script.lock().metadata_requests.values().sum()
    }

    pub fn metadata_requests_to(&self, id: i32) -> usize {
        self.script
            .lock()
            .metadata_requests
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn find_coordinator_requests(&self) -> usize {
        self.script.lock().find_coordinator_requests
    }

    /// Connections the node has accepted over its lifetime.
    pub fn connections_to(&self, id: i32) -> usize {
        self.script.lock().connections.get(&id).copied().unwrap_or(0)
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn serve(mut socket: TcpStream, node: i32, script: Arc<Mutex<Script>>) {
    loop {
        let Ok(size) = socket.read_i32().await else {
            return;
        };
        let mut body = vec![0; size as usize];
        if socket.read_exact(&mut body).await.is_err() {
            return;
        }
        let mut req = Bytes::from(body);
        let api_key = req.get_i16();
        let _api_version = req.get_i16();
        let correlation_id = req.get_i32();
        let client_id_len = req.get_i16();
        if client_id_len > 0 {
            req.advance(client_id_len as usize);
        }

        let (silent, delay) = {
            let mut script = script.lock();
            match api_key {
                API_KEY_METADATA => *script.metadata_requests.entry(node).or_default() += 1,
                API_KEY_FIND_COORDINATOR => script.find_coordinator_requests += 1,
                _ => {}
            }
            (script.silent, script.metadata_delay)
        };
        if silent {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        if api_key == API_KEY_METADATA && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut out = BytesMut::new();
        out.put_i32(correlation_id);
        {
            let script = script.lock();
            match api_key {
                API_KEY_METADATA => metadata_response(&script, read_topics(&mut req), &mut out),
                API_KEY_FIND_COORDINATOR => find_coordinator_response(&script, &mut out),
                _ => return,
            }
        }

        if socket.write_i32(out.len() as i32).await.is_err()
            || socket.write_all(&out).await.is_err()
        {
            return;
        }
    }
}

fn read_string(buf: &mut Bytes) -> String {
    let len = buf.get_i16() as usize;
    String::from_utf8(buf.split_to(len).to_vec()).unwrap()
}

fn read_topics(buf: &mut Bytes) -> Vec<String> {
    let count = buf.get_i32();
    (0..count.max(0)).map(|_| read_string(buf)).collect()
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i16(s.len() as i16);
    buf.put_slice(s.as_bytes());
}

fn metadata_response(script: &Script, requested: Vec<String>, out: &mut BytesMut) {
    out.put_i32(script.advertised.len() as i32);
    for id in script.advertised.iter() {
        out.put_i32(*id);
        put_string(out, "127.0.0.1");
        out.put_i32(script.ports.get(id).copied().unwrap_or(1).into());
    }

    let names: Vec<String> = if requested.is_empty() {
        let mut names: Vec<String> = script.topics.keys().cloned().collect();
        names.extend(
            script
                .topic_errors
                .keys()
                .filter(|name| !script.topics.contains_key(*name))
                .cloned(),
        );
        names
    } else {
        requested
    };
    out.put_i32(names.len() as i32);
    for name in names.iter() {
        if let Some(code) = script.topic_errors.get(name) {
            out.put_i16(*code);
            put_string(out, name);
            out.put_i32(0);
            continue;
        }
        match script.topics.get(name) {
            Some(leaders) => {
                out.put_i16(0);
                put_string(out, name);
                out.put_i32(leaders.len() as i32);
                for (partition, leader) in leaders.iter().enumerate() {
                    out.put_i16(if *leader < 0 { 5 } else { 0 });
                    out.put_i32(partition as i32);
                    out.put_i32(*leader);
                    let replicas: Vec<i32> = if *leader < 0 { vec![] } else { vec![*leader] };
                    for nodes in [&replicas, &replicas] {
                        out.put_i32(nodes.len() as i32);
                        for node in nodes.iter() {
                            out.put_i32(*node);
                        }
                    }
                }
            }
            None => {
                out.put_i16(UNKNOWN_TOPIC_OR_PARTITION);
                put_string(out, name);
                out.put_i32(0);
            }
        }
    }
}

fn find_coordinator_response(script: &Script, out: &mut BytesMut) {
    let id = script.coordinator;
    out.put_i16(0);
    out.put_i32(id);
    put_string(out, "127.0.0.1");
    out.put_i32(script.ports.get(&id).copied().unwrap_or(1).into());
}
