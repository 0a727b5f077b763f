//! Broker capability interface: the only surface the core talks to.
//!
//! Everything above this trait (offset reader, lag, metrics, streaming bridge)
//! is written against `BrokerClient` and `RecordStream`, so the cluster can be
//! a real Kafka deployment (`broker::kafka`) or the in-memory double
//! (`broker::memory`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ========================================
// ERRORS
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Cluster, coordinator or partition leader could not be reached.
    Unreachable,
    /// The broker did not answer within the request deadline.
    Timeout,
    /// The broker answered with an error (unknown topic, bad offset, ...).
    Protocol,
    /// The client handle was closed underneath the caller.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Timeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Protocol, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Closed, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == BrokerErrorKind::Timeout
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            BrokerErrorKind::Unreachable => "unreachable",
            BrokerErrorKind::Timeout => "timeout",
            BrokerErrorKind::Protocol => "protocol",
            BrokerErrorKind::Closed => "closed",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl std::error::Error for BrokerError {}

// ========================================
// METADATA & RECORDS
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDescriptor {
    pub topic: String,
    pub partition: i32,
    /// Broker id of the partition leader.
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerDescriptor {
    pub id: i32,
    pub host: String,
    pub port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
}

/// A record as read from a partition log. Never mutated after the read.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Empty when the record was produced without a key.
    pub key: Bytes,
    pub value: Bytes,
    pub produced_at: DateTime<Utc>,
}

/// Where a group-less partition reader starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    Earliest,
    Latest,
    At(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRecord {
    pub key: Bytes,
    pub value: Bytes,
    /// `None` lets the client's partitioner decide.
    pub partition: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

// ========================================
// CAPABILITIES
// ========================================

/// A live reader over one partition or one group subscription.
///
/// `next_record` waits for as long as it takes; callers bound it with a
/// deadline or a cancellation token. Dropping the future aborts the read.
#[async_trait]
pub trait RecordStream: Send {
    async fn next_record(&mut self) -> Result<ConsumedRecord, BrokerError>;
}

/// Round-trips to the cluster. No retries are performed by implementations;
/// each call opens whatever connection it needs and releases it afterwards.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Reachability check of the bootstrap address.
    async fn dial(&self) -> Result<(), BrokerError>;

    /// Partitions of `topic`, or of every topic when `None`.
    /// An unknown topic yields an empty list.
    async fn read_partitions(&self, topic: Option<&str>) -> Result<Vec<PartitionDescriptor>, BrokerError>;

    async fn list_brokers(&self) -> Result<Vec<BrokerDescriptor>, BrokerError>;

    async fn controller(&self) -> Result<BrokerDescriptor, BrokerError>;

    /// Earliest retrievable offset, asked of the partition leader.
    async fn read_first_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError>;

    /// Log end offset (next offset to be written), asked of the partition leader.
    async fn read_last_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError>;

    /// Committed position of `group`; `None` if the group never committed.
    async fn fetch_committed_offset(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>, BrokerError>;

    async fn open_partition(&self, topic: &str, partition: i32, start: StartOffset) -> Result<Box<dyn RecordStream>, BrokerError>;

    /// Group reader. Starts at the group's committed position (latest when
    /// none) and commits periodically, so a reconnect redelivers at least
    /// everything not yet committed.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn RecordStream>, BrokerError>;

    async fn write_records(&self, topic: &str, records: Vec<OutgoingRecord>) -> Result<Vec<DeliveryReport>, BrokerError>;

    async fn create_topic(&self, name: &str, partitions: i32, replication_factor: i32) -> Result<(), BrokerError>;

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError>;
}
