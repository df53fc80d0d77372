//! Error types & the broker error code table.
use std::io;

use bytes::Bytes;
use num_derive::FromPrimitive;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while talking to a cluster.
///
/// Errors are `Clone` so a single metadata refresh outcome can be handed
/// to every task that was waiting on it.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// Local I/O failure that is not tied to a particular peer.
    #[error("I/O error: {0:?}")]
    IoError(io::ErrorKind),

    /// Socket level failure against one peer: refused, reset, timed out
    /// or closed by the remote end.
    #[error("connection to {addr} failed: {kind:?}")]
    ConnectionError { addr: String, kind: io::ErrorKind },

    /// A broker could not complete a request.
    #[error("broker {broker_id} unavailable: {cause}")]
    BrokerUnavailable { broker_id: i32, cause: Box<Error> },

    /// The broker id is not present in the broker registry.
    #[error("unknown broker {0}")]
    UnknownBroker(i32),

    #[error("topic {0} not found")]
    TopicNotFound(String),

    #[error("partition {partition} of topic {topic} not found")]
    PartitionNotFound { topic: String, partition: i32 },

    /// No seed or known broker answered a metadata request.
    #[error("cluster unreachable: {cause}")]
    ClusterUnreachable { cause: Box<Error> },

    /// An error as reported by a remote broker.
    #[error("Kafka error ({0:?})")]
    KafkaError(KafkaCode),

    #[error("failed to parse response")]
    ParsingError(Bytes),

    #[error("failed to encode request")]
    EncodingError,

    #[error("invalid UTF-8 in response")]
    DecodingUtf8Error,

    #[error("invalid argument: {0}")]
    ArgError(String),

    #[error("cluster has been closed")]
    ClusterClosed,
}

impl Error {
    pub(crate) fn connection(addr: impl ToString, kind: io::ErrorKind) -> Self {
        Error::ConnectionError {
            addr: addr.to_string(),
            kind,
        }
    }

    /// Whether the error means our view of the topology is out of date
    /// and a metadata refresh may fix it.
    ///
    /// [`Error::TopicNotFound`] and [`Error::PartitionNotFound`] are only
    /// returned after a refresh already failed to find the target, so they
    /// are final.
    pub fn needs_refresh(&self) -> bool {
        match self {
            Error::BrokerUnavailable { .. }
            | Error::UnknownBroker(_)
            | Error::ConnectionError { .. } => true,
            Error::KafkaError(code) => code.needs_refresh(),
            _ => false,
        }
    }

    /// The innermost error this one wraps.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::BrokerUnavailable { cause, .. } | Error::ClusterUnreachable { cause } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.kind())
    }
}

#[cfg(feature = "redpanda")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("ERROR: Admin API request failed {:?}", err);
        Error::ArgError(err.to_string())
    }
}

/// Various errors reported by a remote Kafka server.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(i16)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The broker returns this error code for an offset fetch request
    /// if it is still loading offsets (after a leader change for that
    /// offsets topic partition), or in response to group membership
    /// requests (such as heartbeats) when group metadata is being
    /// loaded by the coordinator.
    CoordinatorLoadInProgress = 14,
    /// The broker returns this error code for group coordinator
    /// requests, offset commits, and most group management requests
    /// if the offsets topic has not yet been created, or if the group
    /// coordinator is not active.
    CoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinator = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is
    /// outside of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    TopicAlreadyExists = 36,
    InvalidPartitions = 37,
    InvalidReplicationFactor = 38,
    InvalidReplicaAssignment = 39,
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    InvalidRequest = 42,
    UnsupportedForMessageFormat = 43,
    PolicyViolation = 44,
    OutOfOrderSequenceNumber = 45,
    DuplicateSequenceNumber = 46,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    InvalidTransactionTimeout = 50,
    ConcurrentTransactions = 51,
    TransactionCoordinatorFenced = 52,
    TransactionalIdAuthorizationFailed = 53,
    SecurityDisabled = 54,
    OperationNotAttempted = 55,
    KafkaStorageError = 56,
    LogDirNotFound = 57,
    SaslAuthenticationFailed = 58,
    UnknownProducerId = 59,
    ReassignmentInProgress = 60,
    DelegationTokenAuthDisabled = 61,
    DelegationTokenNotFound = 62,
    DelegationTokenOwnerMismatch = 63,
    DelegationTokenRequestNotAllowed = 64,
    DelegationTokenAuthorizationFailed = 65,
    DelegationTokenExpired = 66,
    InvalidPrincipalType = 67,
    NonEmptyGroup = 68,
    GroupIdNotFound = 69,
    FetchSessionIdNotFound = 70,
    InvalidFetchSessionEpoch = 71,
    ListenerNotFound = 72,
    TopicDeletionDisabled = 73,
    /// The leader epoch in the request is older than the epoch on the
    /// broker.
    FencedLeaderEpoch = 74,
    /// The leader epoch in the request is newer than the epoch on the
    /// broker.
    UnknownLeaderEpoch = 75,
    UnsupportedCompressionType = 76,
    StaleBrokerEpoch = 77,
    OffsetNotAvailable = 78,
    MemberIdRequired = 79,
    PreferredLeaderNotAvailable = 80,
    GroupMaxSizeReached = 81,
    FencedInstanceId = 82,
}

impl KafkaCode {
    /// Codes that mean the client is talking to the wrong broker, or that
    /// leadership is moving, and a metadata refresh should be tried.
    pub fn needs_refresh(self) -> bool {
        matches!(
            self,
            KafkaCode::UnknownTopicOrPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderForPartition
                | KafkaCode::NetworkException
                | KafkaCode::CoordinatorNotAvailable
                | KafkaCode::NotCoordinator
                | KafkaCode::FencedLeaderEpoch
                | KafkaCode::UnknownLeaderEpoch
        )
    }
}
