//! Offset Reader: first/last retrievable offset of a topic-partition.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::broker::{BrokerClient, BrokerError};

/// Offsets of one partition. Each side is `None` when its lookup failed,
/// which is different from a resolved offset of `0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionOffsetRange {
    pub topic: String,
    pub partition: i32,
    pub first_offset: Option<i64>,
    pub last_offset: Option<i64>,
}

impl PartitionOffsetRange {
    pub fn is_resolved(&self) -> bool {
        self.first_offset.is_some() && self.last_offset.is_some()
    }

    /// `last - first`. Over-counts when retention or compaction removed
    /// records inside the range; kept as an estimate on purpose.
    pub fn message_count(&self) -> Option<i64> {
        match (self.first_offset, self.last_offset) {
            (Some(first), Some(last)) => Some(last - first),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct OffsetReader {
    client: Arc<dyn BrokerClient>,
}

impl OffsetReader {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// Both sides are asked independently; one failing leaves the other intact.
    pub async fn read_offset_range(&self, topic: &str, partition: i32) -> PartitionOffsetRange {
        let (first, last) = tokio::join!(
            self.client.read_first_offset(topic, partition),
            self.client.read_last_offset(topic, partition),
        );

        let first_offset = resolved(first, topic, partition, "first");
        let last_offset = resolved(last, topic, partition, "last");

        PartitionOffsetRange {
            topic: topic.to_string(),
            partition,
            first_offset: clamp_first(first_offset, last_offset),
            last_offset,
        }
    }

    pub async fn read_log_end(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        self.client.read_last_offset(topic, partition).await
    }
}

/// The two lookups are not atomic: retention may move the log start past
/// the end read a moment earlier.
fn clamp_first(first: Option<i64>, last: Option<i64>) -> Option<i64> {
    match (first, last) {
        (Some(first), Some(last)) if first > last => Some(last),
        _ => first,
    }
}

fn resolved(result: Result<i64, BrokerError>, topic: &str, partition: i32, side: &str) -> Option<i64> {
    match result {
        Ok(offset) => Some(offset),
        Err(e) => {
            warn!(topic = %topic, partition, side, error = %e, "Offset lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;

    fn reader_with(broker: &MemoryBroker) -> OffsetReader {
        OffsetReader::new(Arc::new(broker.clone()))
    }

    #[test]
    fn test_first_past_last_is_clamped() {
        assert_eq!(clamp_first(Some(12), Some(10)), Some(10));
        assert_eq!(clamp_first(Some(3), Some(10)), Some(3));
        assert_eq!(clamp_first(Some(12), None), Some(12));
        assert_eq!(clamp_first(None, Some(10)), None);
    }

    #[tokio::test]
    async fn test_resolved_range_is_ordered() {
        let broker = MemoryBroker::new();
        broker.add_topic("events", 1);
        for i in 0..5 {
            broker.append("events", 0, "", format!("v{}", i));
        }
        broker.truncate_before("events", 0, 2);

        let range = reader_with(&broker).read_offset_range("events", 0).await;
        assert_eq!(range.first_offset, Some(2));
        assert_eq!(range.last_offset, Some(5));
        assert!(range.first_offset <= range.last_offset);
        assert_eq!(range.message_count(), Some(3));
    }

    #[tokio::test]
    async fn test_empty_partition_resolves_to_zero_not_unresolved() {
        let broker = MemoryBroker::new();
        broker.add_topic("events", 1);

        let range = reader_with(&broker).read_offset_range("events", 0).await;
        assert_eq!(range.first_offset, Some(0));
        assert_eq!(range.last_offset, Some(0));
        assert_eq!(range.message_count(), Some(0));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_side() {
        let broker = MemoryBroker::new();
        broker.add_topic("events", 1);
        broker.append("events", 0, "", "a");
        broker.fail_first_offset("events", 0);

        let range = reader_with(&broker).read_offset_range("events", 0).await;
        assert_eq!(range.first_offset, None);
        assert_eq!(range.last_offset, Some(1));
        assert!(!range.is_resolved());
        assert_eq!(range.message_count(), None);
    }

    #[tokio::test]
    async fn test_unreachable_leader_leaves_both_sides_unresolved() {
        let broker = MemoryBroker::new();
        broker.add_topic("events", 1);
        broker.set_leader_down("events", 0, true);

        let range = reader_with(&broker).read_offset_range("events", 0).await;
        assert_eq!(range.first_offset, None);
        assert_eq!(range.last_offset, None);
    }

    #[tokio::test]
    async fn test_message_count_over_counts_after_compaction() {
        let broker = MemoryBroker::new();
        broker.add_topic("events", 1);
        for i in 0..4 {
            broker.append("events", 0, "k", format!("v{}", i));
        }
        broker.compact("events", 0, 1);
        broker.compact("events", 0, 2);

        let range = reader_with(&broker).read_offset_range("events", 0).await;
        // Two records left, but the estimate still says four.
        assert_eq!(range.message_count(), Some(4));
    }
}
