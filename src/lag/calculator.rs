//! Lag Calculator: committed group offsets vs. log end, per partition.
//!
//! A partition whose log end or committed offset cannot be looked up is left
//! out of the snapshot. One unreachable leader never hides the lag of the
//! rest of the topic.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::broker::{BrokerClient, ConnectionProvider};
use crate::config::LagConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::lag::snapshot::{LagSnapshot, PartitionLag};
use crate::offsets::OffsetReader;

pub struct LagCalculator {
    provider: ConnectionProvider,
    offsets: OffsetReader,
    client: Arc<dyn BrokerClient>,
    config: LagConfig,
}

impl LagCalculator {
    pub fn new(provider: ConnectionProvider, offsets: OffsetReader, config: LagConfig) -> Self {
        let client = provider.client().clone();
        Self { provider, offsets, client, config }
    }

    pub async fn compute_lag(&self, topic: &str, group: &str) -> BridgeResult<LagSnapshot> {
        if topic.is_empty() || group.is_empty() {
            return Err(BridgeError::validation("topic and group are required"));
        }

        let partitions = self.provider.list_partitions(Some(topic)).await?;
        let lookups = partitions
            .iter()
            .map(|p| self.partition_lag(topic, group, p.partition));
        let lags: Vec<PartitionLag> = join_all(lookups).await.into_iter().flatten().collect();

        debug!(
            topic = %topic,
            group = %group,
            resolved = lags.len(),
            total = partitions.len(),
            "Lag computed"
        );
        Ok(LagSnapshot::from_partitions(topic, group, lags))
    }

    /// `None` when either lookup fails.
    async fn partition_lag(&self, topic: &str, group: &str, partition: i32) -> Option<PartitionLag> {
        let committed = tokio::time::timeout(
            self.config.lookup_timeout(),
            self.client.fetch_committed_offset(group, topic, partition),
        );
        let (log_end, committed) = tokio::join!(self.offsets.read_log_end(topic, partition), committed);

        let log_end = match log_end {
            Ok(offset) => offset,
            Err(e) => {
                warn!(topic = %topic, partition, error = %e, "Skipping partition: log end lookup failed");
                return None;
            }
        };
        let committed = match committed {
            // Never committed: the whole log counts as lag.
            Ok(Ok(offset)) => offset.unwrap_or(0),
            Ok(Err(e)) => {
                warn!(topic = %topic, partition, group = %group, error = %e, "Skipping partition: committed offset lookup failed");
                return None;
            }
            Err(_) => {
                warn!(topic = %topic, partition, group = %group, "Skipping partition: committed offset lookup timed out");
                return None;
            }
        };

        Some(PartitionLag::new(partition, committed, log_end))
    }
}
