//! Topic administration and producing, next to the read-side components.

pub mod producer;
pub mod topics;

use crate::broker::ConnectionProvider;
use crate::config::KafkaConfig;
use crate::offsets::OffsetReader;

pub use producer::{BatchMessage, BatchResult, ProduceBatchRequest, ProduceRequest, ProduceResult};
pub use topics::{
    BrokerList, ClusterInfo, CreateTopicRequest, PartitionDetails, TopicChange, TopicDetails, TopicList,
};

pub struct AdminService {
    provider: ConnectionProvider,
    offsets: OffsetReader,
    config: KafkaConfig,
}

impl AdminService {
    pub fn new(provider: ConnectionProvider, offsets: OffsetReader, config: KafkaConfig) -> Self {
        Self { provider, offsets, config }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::BrokerClient;
    use crate::error::BridgeError;

    fn service(broker: &MemoryBroker) -> AdminService {
        let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
        AdminService::new(
            ConnectionProvider::new(client.clone()),
            OffsetReader::new(client),
            KafkaConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_list_and_delete_topic() {
        let broker = MemoryBroker::new();
        let admin = service(&broker);

        admin
            .create_topic(CreateTopicRequest {
                name: "payments".to_string(),
                partitions: 3,
                replication_factor: 1,
            })
            .await
            .unwrap();
        broker.add_topic("audit", 1);

        let list = admin.list_topics().await.unwrap();
        assert_eq!(list.topics, vec!["audit".to_string(), "payments".to_string()]);

        let details = admin.topic_details("payments").await.unwrap();
        assert_eq!(details.partitions.len(), 3);
        assert_eq!(details.partitions[2].offsets.last, Some(0));

        admin.delete_topic("payments").await.unwrap();
        assert!(matches!(
            admin.topic_details("payments").await.unwrap_err(),
            BridgeError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_create_topic_is_validated_first() {
        let broker = MemoryBroker::new();
        broker.set_unreachable(true);
        let admin = service(&broker);

        let err = admin
            .create_topic(CreateTopicRequest {
                name: "payments".to_string(),
                partitions: 0,
                replication_factor: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_produce_reports_delivery() {
        let broker = MemoryBroker::new();
        broker.add_topic("orders", 2);
        let admin = service(&broker);

        let result = admin
            .produce(ProduceRequest {
                topic: "orders".to_string(),
                key: String::new(),
                value: "hello".to_string(),
                partition: Some(1),
            })
            .await
            .unwrap();
        assert_eq!((result.partition, result.offset), (1, 0));

        let batch = admin
            .produce_batch(ProduceBatchRequest {
                topic: "orders".to_string(),
                messages: vec![
                    BatchMessage { key: "a".to_string(), value: "1".to_string() },
                    BatchMessage { key: "a".to_string(), value: "2".to_string() },
                ],
            })
            .await
            .unwrap();
        assert_eq!(batch.message_count, 2);
        // Same key, same partition
        assert_eq!(batch.deliveries[0].partition, batch.deliveries[1].partition);
    }

    #[tokio::test]
    async fn test_cluster_info_reports_controller() {
        let broker = MemoryBroker::new();
        broker.add_topic("orders", 2);
        broker.add_topic("audit", 1);

        let info = service(&broker).cluster_info().await.unwrap();
        assert_eq!(info.topic_count, 2);
        assert_eq!(info.partition_count, 3);
        assert_eq!(info.controller.id, 1);
    }
}
