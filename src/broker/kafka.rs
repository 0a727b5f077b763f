//! `BrokerClient` on top of librdkafka.
//!
//! Every operation builds its own client from `KafkaConfig`, so nothing is
//! shared between sessions. librdkafka's metadata, watermark and committed
//! offset calls block the calling thread and run on the blocking pool.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tokio::net::TcpStream;

use crate::broker::{
    BrokerClient, BrokerDescriptor, BrokerError, ConsumedRecord, DeliveryReport, OutgoingRecord,
    PartitionDescriptor, RecordStream, StartOffset,
};
use crate::config::KafkaConfig;

pub struct KafkaBroker {
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.client_timeout_ms)
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.config.brokers)
            .set("session.timeout.ms", self.config.session_timeout_ms.to_string());
        config
    }

    /// Consumer used only for metadata, watermark and committed-offset queries.
    fn metadata_consumer(&self, group: &str) -> Result<BaseConsumer, BrokerError> {
        let mut config = self.client_config();
        config.set("group.id", group).set("enable.auto.commit", "false");
        config.create().map_err(from_kafka)
    }

    fn admin(&self) -> Result<AdminClient<DefaultClientContext>, BrokerError> {
        self.client_config().create().map_err(from_kafka)
    }

    fn admin_options(&self) -> AdminOptions {
        AdminOptions::new().operation_timeout(Some(self.timeout()))
    }

    /// Runs a blocking librdkafka call with a fresh metadata consumer.
    async fn with_metadata_consumer<T, F>(&self, group: &str, f: F) -> Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(BaseConsumer, Duration) -> Result<T, BrokerError> + Send + 'static,
    {
        let consumer = self.metadata_consumer(group)?;
        let timeout = self.timeout();
        tokio::task::spawn_blocking(move || f(consumer, timeout))
            .await
            .map_err(|e| BrokerError::closed(format!("metadata task failed: {}", e)))?
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<(i64, i64), BrokerError> {
        let topic = topic.to_string();
        let group = self.config.metadata_group.clone();
        self.with_metadata_consumer(&group, move |consumer, timeout| {
            consumer
                .fetch_watermarks(&topic, partition, timeout)
                .map_err(from_kafka)
        })
        .await
    }

    async fn metadata(&self, topic: Option<&str>) -> Result<rdkafka::metadata::Metadata, BrokerError> {
        let topic = topic.map(str::to_string);
        let group = self.config.metadata_group.clone();
        self.with_metadata_consumer(&group, move |consumer, timeout| {
            consumer
                .fetch_metadata(topic.as_deref(), timeout)
                .map_err(from_kafka)
        })
        .await
    }
}

#[async_trait]
impl BrokerClient for KafkaBroker {
    async fn dial(&self) -> Result<(), BrokerError> {
        let addr = self
            .config
            .brokers
            .split(',')
            .map(str::trim)
            .find(|a| !a.is_empty())
            .ok_or_else(|| BrokerError::unreachable("no bootstrap broker configured"))?;

        match tokio::time::timeout(self.timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(BrokerError::unreachable(format!("dial tcp {}: {}", addr, e))),
            Err(_) => Err(BrokerError::timeout(format!("dial tcp {}: timed out", addr))),
        }
    }

    async fn read_partitions(&self, topic: Option<&str>) -> Result<Vec<PartitionDescriptor>, BrokerError> {
        let metadata = self.metadata(topic).await?;
        let mut out = Vec::new();
        for t in metadata.topics() {
            // Unknown topics come back as an entry carrying an error and no partitions.
            if t.error().is_some() && t.partitions().is_empty() {
                continue;
            }
            for p in t.partitions() {
                out.push(PartitionDescriptor {
                    topic: t.name().to_string(),
                    partition: p.id(),
                    leader: p.leader(),
                    replicas: p.replicas().to_vec(),
                    isr: p.isr().to_vec(),
                });
            }
        }
        Ok(out)
    }

    async fn list_brokers(&self) -> Result<Vec<BrokerDescriptor>, BrokerError> {
        let metadata = self.metadata(None).await?;
        Ok(metadata.brokers().iter().map(broker_descriptor).collect())
    }

    async fn controller(&self) -> Result<BrokerDescriptor, BrokerError> {
        let group = self.config.metadata_group.clone();
        self.with_metadata_consumer(&group, |consumer, timeout| {
            let metadata = consumer.fetch_metadata(None, timeout).map_err(from_kafka)?;
            let id = controller_id(&consumer, timeout);
            if id < 0 {
                return Err(BrokerError::timeout("controller id not known yet"));
            }
            metadata
                .brokers()
                .iter()
                .find(|b| b.id() == id)
                .map(broker_descriptor)
                .ok_or_else(|| BrokerError::protocol(format!("controller {} missing from metadata", id)))
        })
        .await
    }

    async fn read_first_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        self.watermarks(topic, partition).await.map(|(low, _)| low)
    }

    async fn read_last_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        self.watermarks(topic, partition).await.map(|(_, high)| high)
    }

    async fn fetch_committed_offset(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>, BrokerError> {
        let topic = topic.to_string();
        self.with_metadata_consumer(group, move |consumer, timeout| {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&topic, partition);
            let committed = consumer.committed_offsets(tpl, timeout).map_err(from_kafka)?;
            let elem = match committed.find_partition(&topic, partition) {
                Some(elem) => elem,
                None => return Ok(None),
            };
            elem.error().map_err(from_kafka)?;
            Ok(match elem.offset() {
                Offset::Offset(offset) => Some(offset),
                _ => None,
            })
        })
        .await
    }

    async fn open_partition(&self, topic: &str, partition: i32, start: StartOffset) -> Result<Box<dyn RecordStream>, BrokerError> {
        let mut config = self.client_config();
        config
            .set("group.id", &self.config.pull_group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false");
        let consumer: StreamConsumer = config.create().map_err(from_kafka)?;

        let offset = match start {
            StartOffset::Earliest => Offset::Beginning,
            StartOffset::Latest => Offset::End,
            StartOffset::At(offset) => Offset::Offset(offset),
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, offset).map_err(from_kafka)?;
        consumer.assign(&tpl).map_err(from_kafka)?;

        Ok(Box::new(KafkaRecordStream { consumer }))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn RecordStream>, BrokerError> {
        let mut config = self.client_config();
        config
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false");
        let consumer: StreamConsumer = config.create().map_err(from_kafka)?;
        consumer.subscribe(&[topic]).map_err(from_kafka)?;

        Ok(Box::new(KafkaRecordStream { consumer }))
    }

    async fn write_records(&self, topic: &str, records: Vec<OutgoingRecord>) -> Result<Vec<DeliveryReport>, BrokerError> {
        let mut config = self.client_config();
        config
            .set("acks", "all")
            .set("message.timeout.ms", self.config.produce_timeout_ms.to_string());
        let producer: FutureProducer = config.create().map_err(from_kafka)?;
        let queue_timeout = Timeout::After(Duration::from_millis(self.config.produce_timeout_ms));

        let sends = records.iter().map(|record| {
            let mut future_record = FutureRecord::<[u8], [u8]>::to(topic).payload(&record.value[..]);
            if !record.key.is_empty() {
                future_record = future_record.key(&record.key[..]);
            }
            if let Some(partition) = record.partition {
                future_record = future_record.partition(partition);
            }
            producer.send(future_record, queue_timeout)
        });

        join_all(sends)
            .await
            .into_iter()
            .map(|result| match result {
                Ok((partition, offset)) => Ok(DeliveryReport { partition, offset }),
                Err((e, _message)) => Err(from_kafka(e)),
            })
            .collect()
    }

    async fn create_topic(&self, name: &str, partitions: i32, replication_factor: i32) -> Result<(), BrokerError> {
        let topic = NewTopic::new(name, partitions, TopicReplication::Fixed(replication_factor));
        let results = self
            .admin()?
            .create_topics(&[topic], &self.admin_options())
            .await
            .map_err(from_kafka)?;
        for result in results {
            if let Err((topic, code)) = result {
                return Err(BrokerError::protocol(format!("{}: {}", topic, code)));
            }
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        let results = self
            .admin()?
            .delete_topics(&[name], &self.admin_options())
            .await
            .map_err(from_kafka)?;
        for result in results {
            if let Err((topic, code)) = result {
                return Err(BrokerError::protocol(format!("{}: {}", topic, code)));
            }
        }
        Ok(())
    }
}

// ========================================
// RECORD STREAM
// ========================================

struct KafkaRecordStream {
    consumer: StreamConsumer,
}

#[async_trait]
impl RecordStream for KafkaRecordStream {
    async fn next_record(&mut self) -> Result<ConsumedRecord, BrokerError> {
        let message = self.consumer.recv().await.map_err(from_kafka)?;
        Ok(record_from_message(&message))
    }
}

/// Controller broker id as librdkafka last saw it, or `-1` if not yet known.
fn controller_id(consumer: &BaseConsumer, timeout: Duration) -> i32 {
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    // SAFETY: the native handle is owned by `consumer`, which the borrow keeps alive.
    unsafe { rdkafka::bindings::rd_kafka_controllerid(consumer.client().native_ptr(), timeout_ms) }
}

fn record_from_message(message: &BorrowedMessage<'_>) -> ConsumedRecord {
    let produced_at = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);
    ConsumedRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(Bytes::copy_from_slice).unwrap_or_default(),
        value: message.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
        produced_at,
    }
}

fn broker_descriptor(broker: &rdkafka::metadata::MetadataBroker) -> BrokerDescriptor {
    BrokerDescriptor {
        id: broker.id(),
        host: broker.host().to_string(),
        port: broker.port(),
        rack: None,
    }
}

fn from_kafka(error: KafkaError) -> BrokerError {
    let message = error.to_string();
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            BrokerError::timeout(message)
        }
        Some(RDKafkaErrorCode::AllBrokersDown)
        | Some(RDKafkaErrorCode::BrokerTransportFailure)
        | Some(RDKafkaErrorCode::BrokerNotAvailable)
        | Some(RDKafkaErrorCode::LeaderNotAvailable)
        | Some(RDKafkaErrorCode::NotLeaderForPartition)
        | Some(RDKafkaErrorCode::CoordinatorNotAvailable) => BrokerError::unreachable(message),
        _ => BrokerError::protocol(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_id_unknown_without_cluster() {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", "127.0.0.1:1")
            .set("group.id", "controller-lookup")
            .create()
            .unwrap();

        assert_eq!(controller_id(&consumer, Duration::from_millis(100)), -1);
    }
}
