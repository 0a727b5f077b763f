//! Connection Provider: dials the cluster and answers metadata questions.
//!
//! No pooling: every logical operation dials on its own and drops the handle
//! when done. No retries either, callers decide what a failure means.

use std::sync::Arc;

use crate::broker::{BrokerClient, BrokerDescriptor, PartitionDescriptor};
use crate::error::{BridgeError, BridgeResult};

#[derive(Clone)]
pub struct ConnectionProvider {
    client: Arc<dyn BrokerClient>,
}

/// A dialed, single-use handle. Lives for one logical operation.
pub struct Connection {
    client: Arc<dyn BrokerClient>,
}

impl ConnectionProvider {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    pub async fn connect(&self) -> BridgeResult<Connection> {
        self.client
            .dial()
            .await
            .map_err(|cause| BridgeError::connect("connect to Kafka", cause))?;
        Ok(Connection { client: self.client.clone() })
    }

    pub async fn list_partitions(&self, topic: Option<&str>) -> BridgeResult<Vec<PartitionDescriptor>> {
        self.connect().await?.read_partitions(topic).await
    }

    pub async fn list_brokers(&self) -> BridgeResult<Vec<BrokerDescriptor>> {
        self.connect().await?.brokers().await
    }

    pub async fn controller(&self) -> BridgeResult<BrokerDescriptor> {
        self.connect().await?.controller().await
    }
}

impl Connection {
    pub async fn read_partitions(&self, topic: Option<&str>) -> BridgeResult<Vec<PartitionDescriptor>> {
        self.client
            .read_partitions(topic)
            .await
            .map_err(|cause| BridgeError::connect("read partitions", cause))
    }

    pub async fn brokers(&self) -> BridgeResult<Vec<BrokerDescriptor>> {
        self.client
            .list_brokers()
            .await
            .map_err(|cause| BridgeError::connect("get brokers", cause))
    }

    pub async fn controller(&self) -> BridgeResult<BrokerDescriptor> {
        self.client
            .controller()
            .await
            .map_err(|cause| BridgeError::connect("get controller", cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;

    #[tokio::test]
    async fn test_connect_fails_when_cluster_unreachable() {
        let broker = MemoryBroker::new();
        broker.set_unreachable(true);
        let provider = ConnectionProvider::new(Arc::new(broker));

        let err = provider.list_partitions(None).await.err().unwrap();
        match err {
            BridgeError::Connect { op, cause } => {
                assert_eq!(op, "connect to Kafka");
                assert_eq!(cause.kind, crate::broker::BrokerErrorKind::Unreachable);
            }
            other => panic!("expected connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_round_trips() {
        let broker = MemoryBroker::new();
        broker.add_topic("orders", 3);
        broker.add_topic("audit", 1);
        let provider = ConnectionProvider::new(Arc::new(broker));

        assert_eq!(provider.list_partitions(Some("orders")).await.unwrap().len(), 3);
        assert_eq!(provider.list_partitions(None).await.unwrap().len(), 4);
        assert!(provider.list_partitions(Some("missing")).await.unwrap().is_empty());
        assert_eq!(provider.list_brokers().await.unwrap().len(), 1);
        assert_eq!(provider.controller().await.unwrap().id, 1);
    }
}
