use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::admin::AdminService;
use crate::broker::{BrokerError, DeliveryReport, OutgoingRecord};
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ProduceRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub partition: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchMessage {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProduceBatchRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub messages: Vec<BatchMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProduceResult {
    pub status: &'static str,
    pub topic: String,
    pub key: String,
    pub partition: i32,
    pub offset: i64,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub status: &'static str,
    pub topic: String,
    pub message_count: usize,
    pub deliveries: Vec<DeliveryReport>,
    pub message: &'static str,
}

impl AdminService {
    pub async fn produce(&self, request: ProduceRequest) -> BridgeResult<ProduceResult> {
        if request.topic.is_empty() {
            return Err(BridgeError::validation("topic is required"));
        }
        if request.value.is_empty() {
            return Err(BridgeError::validation("value is required"));
        }

        let record = OutgoingRecord {
            key: Bytes::from(request.key.clone()),
            value: Bytes::from(request.value),
            partition: request.partition,
        };
        let reports = self
            .write(&request.topic, vec![record], self.config.produce_timeout_ms)
            .await
            .map_err(|cause| BridgeError::connect("produce message", cause))?;
        let report = reports
            .first()
            .copied()
            .ok_or_else(|| BridgeError::Broker(BrokerError::protocol("no delivery report")))?;

        debug!(topic = %request.topic, partition = report.partition, offset = report.offset, "Produced");
        Ok(ProduceResult {
            status: "success",
            topic: request.topic,
            key: request.key,
            partition: report.partition,
            offset: report.offset,
            message: "Message sent successfully",
        })
    }

    pub async fn produce_batch(&self, request: ProduceBatchRequest) -> BridgeResult<BatchResult> {
        if request.topic.is_empty() {
            return Err(BridgeError::validation("topic is required"));
        }
        if request.messages.is_empty() {
            return Err(BridgeError::validation("messages must not be empty"));
        }

        let records = request
            .messages
            .into_iter()
            .map(|m| OutgoingRecord {
                key: Bytes::from(m.key),
                value: Bytes::from(m.value),
                partition: None,
            })
            .collect::<Vec<_>>();
        let count = records.len();

        let deliveries = self
            .write(&request.topic, records, self.config.batch_produce_timeout_ms)
            .await
            .map_err(|cause| BridgeError::connect("produce batch messages", cause))?;

        debug!(topic = %request.topic, count, "Produced batch");
        Ok(BatchResult {
            status: "success",
            topic: request.topic,
            message_count: count,
            deliveries,
            message: "Batch messages sent successfully",
        })
    }

    async fn write(
        &self,
        topic: &str,
        records: Vec<OutgoingRecord>,
        timeout_ms: u64,
    ) -> Result<Vec<DeliveryReport>, BrokerError> {
        let write = self.provider.client().write_records(topic, records);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), write).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::timeout(format!("write to '{}' timed out", topic))),
        }
    }
}
