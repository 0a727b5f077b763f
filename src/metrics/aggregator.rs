//! Metrics Aggregator: read-only views over the cluster, rebuilt per request.

use std::collections::BTreeMap;

use chrono::Utc;
use futures_util::future::join_all;

use crate::broker::{ConnectionProvider, PartitionDescriptor};
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::snapshot::{
    ClusterSnapshot, PartitionSnapshot, PartitionSummary, TopicSnapshot, TopicSummary,
};
use crate::offsets::{OffsetReader, PartitionOffsetRange};

pub struct MetricsAggregator {
    provider: ConnectionProvider,
    offsets: OffsetReader,
}

impl MetricsAggregator {
    pub fn new(provider: ConnectionProvider, offsets: OffsetReader) -> Self {
        Self { provider, offsets }
    }

    pub async fn cluster_snapshot(&self) -> BridgeResult<ClusterSnapshot> {
        let brokers = self.provider.list_brokers().await?;
        let partitions = self.provider.list_partitions(None).await?;
        let ranges = self.read_ranges(&partitions).await;

        let mut topics: BTreeMap<&str, TopicSummary> = BTreeMap::new();
        for (descriptor, range) in partitions.iter().zip(ranges.iter()) {
            let summary = topics.entry(descriptor.topic.as_str()).or_insert_with(|| TopicSummary {
                name: descriptor.topic.clone(),
                partition_count: 0,
                total_messages: 0,
                total_size: 0,
            });
            summary.partition_count += 1;
            summary.total_messages += range.message_count().unwrap_or(0);
        }

        Ok(ClusterSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            broker_count: brokers.len(),
            topic_count: topics.len(),
            partition_count: partitions.len(),
            topics: topics.into_values().collect(),
        })
    }

    pub async fn topic_snapshot(&self, topic: &str) -> BridgeResult<TopicSnapshot> {
        let partitions = self.provider.list_partitions(Some(topic)).await?;
        if partitions.is_empty() {
            return Err(BridgeError::not_found(format!("Topic '{}' not found", topic)));
        }
        let ranges = self.read_ranges(&partitions).await;

        let mut total_messages = 0;
        let mut summaries = Vec::with_capacity(partitions.len());
        for (descriptor, range) in partitions.iter().zip(ranges) {
            total_messages += range.message_count().unwrap_or(0);
            summaries.push(PartitionSummary {
                partition: descriptor.partition,
                leader: descriptor.leader,
                replicas: descriptor.replicas.len(),
                isr: descriptor.isr.len(),
                first_offset: range.first_offset,
                last_offset: range.last_offset,
                message_count: range.message_count(),
            });
        }
        summaries.sort_by_key(|p| p.partition);

        Ok(TopicSnapshot {
            topic: topic.to_string(),
            partition_count: summaries.len(),
            total_messages,
            partitions: summaries,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    pub async fn partition_snapshot(&self, topic: &str, partition: i32) -> BridgeResult<PartitionSnapshot> {
        let range = self.offsets.read_offset_range(topic, partition).await;
        match (range.first_offset, range.last_offset) {
            (Some(first_offset), Some(last_offset)) => Ok(PartitionSnapshot {
                topic: topic.to_string(),
                partition,
                first_offset,
                last_offset,
                message_count: last_offset - first_offset,
                timestamp: Utc::now().to_rfc3339(),
            }),
            _ => Err(BridgeError::not_found(format!(
                "Partition {} of topic '{}' not found",
                partition, topic
            ))),
        }
    }

    async fn read_ranges(&self, partitions: &[PartitionDescriptor]) -> Vec<PartitionOffsetRange> {
        join_all(
            partitions
                .iter()
                .map(|p| self.offsets.read_offset_range(&p.topic, p.partition)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::BrokerClient;

    fn aggregator(broker: &MemoryBroker) -> MetricsAggregator {
        let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
        MetricsAggregator::new(ConnectionProvider::new(client.clone()), OffsetReader::new(client))
    }

    fn seeded() -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.add_topic("orders", 2);
        broker.add_topic("audit", 1);
        for _ in 0..3 {
            broker.append("orders", 0, "", "o");
        }
        broker.append("orders", 1, "", "o");
        broker.append("audit", 0, "", "a");
        broker
    }

    #[tokio::test]
    async fn test_cluster_snapshot_groups_partitions_by_topic() {
        let broker = seeded();
        let snapshot = aggregator(&broker).cluster_snapshot().await.unwrap();

        assert_eq!(snapshot.broker_count, 1);
        assert_eq!(snapshot.topic_count, 2);
        assert_eq!(snapshot.partition_count, 3);
        let names: Vec<_> = snapshot.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["audit", "orders"]);
        assert_eq!(snapshot.topics[1].total_messages, 4);
        assert_eq!(snapshot.topics[1].total_size, 0);
    }

    #[tokio::test]
    async fn test_unresolved_partition_does_not_count_towards_totals() {
        let broker = seeded();
        broker.set_leader_down("orders", 0, true);

        let snapshot = aggregator(&broker).topic_snapshot("orders").await.unwrap();
        assert_eq!(snapshot.partition_count, 2);
        assert_eq!(snapshot.total_messages, 1);
        assert_eq!(snapshot.partitions[0].first_offset, None);
        assert_eq!(snapshot.partitions[0].isr, 0);
        assert_eq!(snapshot.partitions[1].message_count, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_topic_is_not_found() {
        let broker = seeded();
        let err = aggregator(&broker).topic_snapshot("missing").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_partition_snapshot_requires_both_sides() {
        let broker = seeded();
        let metrics = aggregator(&broker);

        let snapshot = metrics.partition_snapshot("orders", 0).await.unwrap();
        assert_eq!(snapshot.message_count, 3);

        broker.fail_last_offset("orders", 0);
        let err = metrics.partition_snapshot("orders", 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_fails_cluster_snapshot() {
        let broker = seeded();
        broker.set_unreachable(true);
        let err = aggregator(&broker).cluster_snapshot().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect { .. }));
    }
}
