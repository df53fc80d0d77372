use std::{io, net::SocketAddr, time::Duration};

use bytes::{BufMut, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpSocket, TcpStream},
    time::timeout,
};
use tracing::instrument;

use super::BrokerAddress;
use crate::{
    encode::ToByte,
    error::{Error, Result},
};

/// Largest response frame accepted, matching the broker's default
/// `socket.request.max.bytes`.
const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// One TCP connection to a Kafka/Redpanda broker.
///
/// A connection performs strict request/response cycles: [`send`](Self::send)
/// writes one size delimited frame and waits for exactly one frame back.
/// Every exchange is bounded by the connection's timeout. Any failure
/// closes the socket, since a half-read frame would desynchronize
/// everything that follows; the owner is expected to reconnect.
///
/// Typically this would only be used directly in a low level context.
/// Otherwise a [`Broker`](crate::broker::Broker) manages connections on
/// behalf of the cluster.
#[derive(Debug)]
pub struct Connection {
    addr: BrokerAddress,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl Connection {
    /// Connect to a broker, optionally binding the local end to
    /// `source_address`.
    ///
    /// Fails with [`Error::ConnectionError`] on refusal, DNS failure, or
    /// when `timeout` elapses first.
    #[instrument(name = "network-connect", level = "debug")]
    pub async fn connect(
        addr: BrokerAddress,
        timeout_duration: Duration,
        source_address: Option<SocketAddr>,
    ) -> Result<Self> {
        let stream = timeout(timeout_duration, open(&addr, source_address))
            .await
            .map_err(|_| {
                tracing::warn!("Timed out connecting to {}", addr);
                Error::connection(&addr, io::ErrorKind::TimedOut)
            })??;
        stream
            .set_nodelay(true)
            .map_err(|err| Error::connection(&addr, err.kind()))?;

        tracing::debug!("Connected to {}", addr);
        Ok(Self {
            addr,
            timeout: timeout_duration,
            stream: Some(stream),
        })
    }

    pub fn addr(&self) -> &BrokerAddress {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Serialize a request, send it, and wait for the matching response.
    ///
    /// The returned bytes are the whole response frame without its size
    /// prefix, starting at the response header.
    #[instrument(name = "network-send", level = "trace", skip(self, req), fields(addr = %self.addr))]
    pub async fn send<R: ToByte>(&mut self, req: &R) -> Result<BytesMut> {
        let mut buffer = Vec::with_capacity(64);
        buffer.put_i32(0);
        req.encode(&mut buffer)?;

        let size = i32::try_from(buffer.len() - 4).map_err(|_| Error::EncodingError)?;
        size.encode(&mut &mut buffer[..])?;

        let result = match timeout(self.timeout, self.exchange(&buffer)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Request to {} timed out after {:?}", self.addr, self.timeout);
                Err(Error::connection(&self.addr, io::ErrorKind::TimedOut))
            }
        };

        if result.is_err() {
            self.close();
        }
        result
    }

    async fn exchange(&mut self, frame: &[u8]) -> Result<BytesMut> {
        let addr = &self.addr;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::connection(addr, io::ErrorKind::NotConnected))?;

        tracing::trace!("Sending bytes {}", frame.len());
        stream.write_all(frame).await.map_err(|err| {
            tracing::error!("ERROR: Writing to Socket {:?}", err);
            Error::connection(addr, err.kind())
        })?;

        // figure out the message size
        let length = stream.read_i32().await.map_err(|err| {
            tracing::warn!("ERROR: Reading on Socket {:?}", err);
            Error::connection(addr, err.kind())
        })?;
        let length = usize::try_from(length)
            .ok()
            .filter(|length| *length <= MAX_RESPONSE_SIZE)
            .ok_or_else(|| {
                tracing::error!("ERROR: Invalid response size {} from {}", length, addr);
                Error::connection(addr, io::ErrorKind::InvalidData)
            })?;

        tracing::trace!("Reading {} bytes", length);
        let mut buf = BytesMut::zeroed(length);
        stream.read_exact(&mut buf).await.map_err(|err| {
            tracing::warn!("ERROR: Reading on Socket {:?}", err);
            Error::connection(addr, err.kind())
        })?;
        Ok(buf)
    }

    /// Drop the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Closed connection to {}", self.addr);
        }
    }
}

async fn open(addr: &BrokerAddress, source_address: Option<SocketAddr>) -> Result<TcpStream> {
    let candidates = lookup_host((addr.host.as_str(), addr.port))
        .await
        .map_err(|err| {
            tracing::error!("Error could not resolve {} {:?}", addr, err);
            Error::connection(addr, err.kind())
        })?;

    let mut propagated_err = Error::connection(addr, io::ErrorKind::NotFound);
    for candidate in candidates {
        // a bound source address pins the address family
        if let Some(source) = source_address {
            if source.is_ipv4() != candidate.is_ipv4() {
                continue;
            }
        }
        match connect_one(candidate, source_address).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tracing::debug!("Could not connect to {} ({}): {:?}", addr, candidate, err);
                propagated_err = Error::connection(addr, err.kind());
            }
        }
    }
    Err(propagated_err)
}

async fn connect_one(target: SocketAddr, source_address: Option<SocketAddr>) -> io::Result<TcpStream> {
    match source_address {
        None => TcpStream::connect(target).await,
        Some(source) => {
            let socket = if target.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.bind(source)?;
            socket.connect(target).await
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
