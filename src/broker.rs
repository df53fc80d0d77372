//! A logical broker endpoint that survives connection churn.
use std::{
    fmt,
    io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use bytes::BytesMut;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    network::{BrokerAddress, Connection},
    protocol::{peek_correlation_id, Request},
};

/// Which of a broker's two connections a request travels on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Metadata, produce, fetch and everything else.
    General,
    /// Offset commit and fetch traffic, with its own timeout.
    Offsets,
}

/// Socket settings shared by every broker of a cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionSettings {
    pub socket_timeout: Duration,
    pub offsets_channel_socket_timeout: Duration,
    pub source_address: Option<SocketAddr>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_millis(30_000),
            offsets_channel_socket_timeout: Duration::from_millis(10_000),
            source_address: None,
        }
    }
}

/// Handle to one broker of the cluster.
///
/// Holds up to two [`Connection`]s, one per [`Channel`], each opened lazily
/// on first use and reopened lazily on the next request after a failure.
/// Nothing reconnects in the background, so a broker that is down for a
/// long time costs nothing until someone asks for it.
///
/// Requests on the same channel are strictly serialized; the general and
/// offsets channels proceed independently.
pub struct Broker {
    id: i32,
    addr: BrokerAddress,
    settings: ConnectionSettings,
    general: Mutex<Option<Connection>>,
    offsets: Mutex<Option<Connection>>,
    alive: AtomicBool,
    retired: AtomicBool,
    connects: AtomicUsize,
}

impl Broker {
    /// Create an unconnected handle.
    pub fn new(id: i32, addr: BrokerAddress, settings: ConnectionSettings) -> Self {
        Self {
            id,
            addr,
            settings,
            general: Mutex::new(None),
            offsets: Mutex::new(None),
            alive: AtomicBool::new(true),
            retired: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn addr(&self) -> &BrokerAddress {
        &self.addr
    }

    /// Last observed connection health. No network round trip.
    ///
    /// A broker that has never been used counts as alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Whether the general channel currently holds an open socket.
    pub fn is_connected(&self) -> bool {
        match self.general.try_lock() {
            Ok(slot) => slot.as_ref().is_some_and(Connection::is_connected),
            // someone is mid-request on it
            Err(_) => true,
        }
    }

    /// Set once the broker has dropped out of the cluster's metadata.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// How many sockets this handle has opened over its lifetime.
    pub fn connections_opened(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    /// Send a request on the general channel and decode the response.
    pub async fn send<R: Request>(&self, req: &R) -> Result<R::Response> {
        self.send_on(Channel::General, req).await
    }

    /// Send a request on the offsets channel and decode the response.
    pub async fn send_offsets<R: Request>(&self, req: &R) -> Result<R::Response> {
        self.send_on(Channel::Offsets, req).await
    }

    /// Send a request on the given channel, connecting first if needed.
    ///
    /// Socket failures mark the broker dead and surface as
    /// [`Error::BrokerUnavailable`] carrying the socket error.
    /// A retired broker refuses with [`Error::UnknownBroker`].
    #[instrument(name = "broker-send", level = "debug", skip(self, req), fields(broker = self.id))]
    pub async fn send_on<R: Request>(&self, channel: Channel, req: &R) -> Result<R::Response> {
        let (slot, timeout) = match channel {
            Channel::General => (&self.general, self.settings.socket_timeout),
            Channel::Offsets => (&self.offsets, self.settings.offsets_channel_socket_timeout),
        };

        let mut slot = slot.lock().await;
        if self.is_retired() {
            if let Some(conn) = slot.as_mut() {
                conn.close();
            }
            return Err(Error::UnknownBroker(self.id));
        }
        let frame = match self.exchange(&mut slot, timeout, req).await {
            Ok(frame) => frame,
            Err(err @ Error::ConnectionError { .. }) => {
                if self.alive.swap(false, Ordering::AcqRel) {
                    tracing::warn!("Broker {} at {} is unavailable: {}", self.id, self.addr, err);
                }
                return Err(Error::BrokerUnavailable {
                    broker_id: self.id,
                    cause: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        };
        self.alive.store(true, Ordering::Release);

        let expected = req.header().correlation_id;
        if peek_correlation_id(&frame) != Some(expected) {
            tracing::error!(
                "ERROR: Broker {} answered with the wrong correlation id, expected {}",
                self.id,
                expected
            );
            if let Some(conn) = slot.as_mut() {
                conn.close();
            }
            return Err(Error::ParsingError(frame.freeze()));
        }
        drop(slot);

        R::Response::try_from(frame.freeze())
    }

    async fn exchange<R: Request>(
        &self,
        slot: &mut Option<Connection>,
        timeout: Duration,
        req: &R,
    ) -> Result<BytesMut> {
        if !slot.as_ref().is_some_and(Connection::is_connected) {
            tracing::debug!("Connecting to broker {} at {}", self.id, self.addr);
            let conn =
                Connection::connect(self.addr.clone(), timeout, self.settings.source_address)
                    .await?;
            self.connects.fetch_add(1, Ordering::Relaxed);
            *slot = Some(conn);
        }
        let conn = slot
            .as_mut()
            .ok_or_else(|| Error::connection(&self.addr, io::ErrorKind::NotConnected))?;
        conn.send(req).await
    }

    /// Take the broker out of service without waiting.
    ///
    /// Idle connections are closed right away; one that is mid-request is
    /// closed by the next caller to acquire it. Sends from then on fail.
    pub fn retire(&self) {
        if self.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in [&self.general, &self.offsets] {
            if let Ok(mut slot) = slot.try_lock() {
                if let Some(conn) = slot.as_mut() {
                    conn.close();
                }
            }
        }
        tracing::info!("Retired broker {} at {}", self.id, self.addr);
    }

    /// Close both connections. The handle stays usable and will reconnect
    /// on the next request.
    pub async fn close(&self) {
        for slot in [&self.general, &self.offsets] {
            if let Some(conn) = slot.lock().await.as_mut() {
                conn.close();
            }
        }
        tracing::debug!("Closed broker {} at {}", self.id, self.addr);
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("alive", &self.is_alive())
            .field("retired", &self.is_retired())
            .finish()
    }
}
