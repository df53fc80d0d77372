//! Locate the current coordinator of a consumer group.

pub mod request;
pub mod response;
