//! Encoding and creation for Find Coordinator requests.
//!
//! The offsets for a given consumer group are maintained by a
//! specific broker called the group coordinator, so offset commit
//! and fetch traffic has to be addressed to it. It can be discovered
//! by asking any broker.
//!
//! ### Protocol Def
//! ```text
//! FindCoordinator Request (Version: 0) => key
//!   key => STRING
//! ```
//!
//! Note we are using version 0 of the request.

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{FindCoordinatorResponse, HeaderRequest, Request},
};

pub const API_KEY_FIND_COORDINATOR: i16 = 10;
const API_VERSION: i16 = 0;

/// The base Find Coordinator request object.
#[derive(Debug)]
pub struct FindCoordinatorRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The coordinator key, i.e. the group id.
    pub key: &'a str,
}

impl<'a> FindCoordinatorRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, key: &'a str) -> Self {
        let header = HeaderRequest::new(
            API_KEY_FIND_COORDINATOR,
            API_VERSION,
            correlation_id,
            client_id,
        );
        Self { header, key }
    }
}

impl<'a> ToByte for FindCoordinatorRequest<'a> {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        tracing::trace!("Encoding FindCoordinatorRequest {:?}", self);
        self.header.encode(buffer)?;
        self.key.encode(buffer)?;
        Ok(())
    }
}

impl<'a> Request for FindCoordinatorRequest<'a> {
    type Response = FindCoordinatorResponse;

    fn header(&self) -> &HeaderRequest<'_> {
        &self.header
    }
}
