use std::collections::BTreeSet;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admin::AdminService;
use crate::broker::BrokerDescriptor;
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Serialize)]
pub struct TopicList {
    pub topics: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicDetails {
    pub name: String,
    pub partitions: Vec<PartitionDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionDetails {
    pub id: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub offsets: OffsetPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct OffsetPair {
    pub first: Option<i64>,
    pub last: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub partitions: i32,
    #[serde(default)]
    pub replication_factor: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicChange {
    pub status: &'static str,
    pub topic: String,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerList {
    pub brokers: Vec<BrokerDescriptor>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterInfo {
    pub broker_count: usize,
    pub topic_count: usize,
    pub partition_count: usize,
    pub controller: ControllerInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerInfo {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

impl AdminService {
    pub async fn list_topics(&self) -> BridgeResult<TopicList> {
        let partitions = self.provider.list_partitions(None).await?;
        let topics: Vec<String> = partitions
            .into_iter()
            .map(|p| p.topic)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(TopicList { count: topics.len(), topics })
    }

    pub async fn topic_details(&self, name: &str) -> BridgeResult<TopicDetails> {
        let mut partitions = self.provider.list_partitions(Some(name)).await?;
        if partitions.is_empty() {
            return Err(BridgeError::not_found(format!("Topic '{}' not found", name)));
        }
        partitions.sort_by_key(|p| p.partition);

        let ranges = join_all(
            partitions
                .iter()
                .map(|p| self.offsets.read_offset_range(&p.topic, p.partition)),
        )
        .await;

        let partitions = partitions
            .into_iter()
            .zip(ranges)
            .map(|(p, range)| PartitionDetails {
                id: p.partition,
                leader: p.leader,
                replicas: p.replicas,
                isr: p.isr,
                offsets: OffsetPair {
                    first: range.first_offset,
                    last: range.last_offset,
                },
            })
            .collect();

        Ok(TopicDetails { name: name.to_string(), partitions })
    }

    pub async fn create_topic(&self, request: CreateTopicRequest) -> BridgeResult<TopicChange> {
        if request.name.is_empty() {
            return Err(BridgeError::validation("name is required"));
        }
        if request.partitions < 1 {
            return Err(BridgeError::validation("partitions must be at least 1"));
        }
        if request.replication_factor < 1 {
            return Err(BridgeError::validation("replicationFactor must be at least 1"));
        }

        self.provider.connect().await?;
        self.provider
            .client()
            .create_topic(&request.name, request.partitions, request.replication_factor)
            .await
            .map_err(|cause| BridgeError::connect("create topic", cause))?;

        info!(
            topic = %request.name,
            partitions = request.partitions,
            replication_factor = request.replication_factor,
            "Topic created"
        );
        Ok(TopicChange {
            status: "success",
            topic: request.name,
            message: "Topic created successfully",
        })
    }

    pub async fn delete_topic(&self, name: &str) -> BridgeResult<TopicChange> {
        if name.is_empty() {
            return Err(BridgeError::validation("topic name is required"));
        }

        self.provider.connect().await?;
        self.provider
            .client()
            .delete_topic(name)
            .await
            .map_err(|cause| BridgeError::connect("delete topic", cause))?;

        info!(topic = %name, "Topic deleted");
        Ok(TopicChange {
            status: "success",
            topic: name.to_string(),
            message: "Topic deleted successfully",
        })
    }

    pub async fn list_brokers(&self) -> BridgeResult<BrokerList> {
        let brokers = self.provider.list_brokers().await?;
        Ok(BrokerList { count: brokers.len(), brokers })
    }

    pub async fn cluster_info(&self) -> BridgeResult<ClusterInfo> {
        let connection = self.provider.connect().await?;
        let brokers = connection.brokers().await?;
        let controller = connection.controller().await?;
        let partitions = connection.read_partitions(None).await?;

        let topic_count = partitions
            .iter()
            .map(|p| p.topic.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Ok(ClusterInfo {
            broker_count: brokers.len(),
            topic_count,
            partition_count: partitions.len(),
            controller: ControllerInfo {
                id: controller.id,
                host: controller.host,
                port: controller.port,
            },
        })
    }
}
