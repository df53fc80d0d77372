//! Bytecode protocol requests & responses.
//!
//! This module implements the subset of the protocol outlined in the
//! [Kafka Documentation](https://kafka.apache.org/protocol.html) that
//! cluster management needs: topology discovery and group coordinator
//! lookup. Everything else is treated as an opaque [`Request`] by the
//! broker layer.
//!
//! The module is set up as a list of message pairs containing two files
//! each corresponding to the request and response.

pub mod find_coordinator;
pub mod metadata;

use std::fmt::Debug;

use bytes::{BufMut, Bytes};
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

// re exporting these for ease
pub use self::{
    find_coordinator::{request::FindCoordinatorRequest, response::FindCoordinatorResponse},
    metadata::{request::MetadataRequest, response::MetadataResponse},
};
use crate::{
    encode::ToByte,
    error::{Error, Result},
};

/// A request the broker layer can send and decode the answer to.
///
/// The request is encoded with [`ToByte`]; the raw response frame
/// (header included) is handed to `Response::try_from`.
pub trait Request: ToByte + Debug + Send + Sync {
    type Response: TryFrom<Bytes, Error = Error> + Send;

    fn header(&self) -> &HeaderRequest<'_>;
}

#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: &'a str,
}

impl<'a> HeaderRequest<'a> {
    /// Create new header request.
    ///
    /// This goes at the beginning of every single request.
    pub fn new(
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        client_id: &'a str,
    ) -> HeaderRequest<'a> {
        HeaderRequest {
            api_key,
            api_version,
            correlation_id,
            client_id,
        }
    }
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

/// Read the correlation id off the front of a raw response frame.
pub fn peek_correlation_id(frame: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = frame.get(..4)?.try_into().ok()?;
    Some(i32::from_be_bytes(bytes))
}
