use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionLag {
    pub partition: i32,
    #[serde(rename = "current_offset")]
    pub committed_offset: i64,
    pub log_end_offset: i64,
    pub lag: i64,
}

impl PartitionLag {
    /// Lag never goes negative, even if the committed offset ran ahead of the
    /// log end we observed.
    pub fn new(partition: i32, committed_offset: i64, log_end_offset: i64) -> Self {
        Self {
            partition,
            committed_offset,
            log_end_offset,
            lag: (log_end_offset - committed_offset).max(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagSnapshot {
    pub topic: String,
    pub group: String,
    pub total_lag: i64,
    pub partition_lags: Vec<PartitionLag>,
}

impl LagSnapshot {
    /// Orders entries by partition and sums only what was included.
    pub fn from_partitions(topic: &str, group: &str, mut partition_lags: Vec<PartitionLag>) -> Self {
        partition_lags.sort_by_key(|p| p.partition);
        let total_lag = partition_lags.iter().map(|p| p.lag).sum();
        Self {
            topic: topic.to_string(),
            group: group.to_string(),
            total_lag,
            partition_lags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_is_clamped_at_zero() {
        let lag = PartitionLag::new(0, 120, 100);
        assert_eq!(lag.lag, 0);

        let lag = PartitionLag::new(1, 40, 100);
        assert_eq!(lag.lag, 60);
    }

    #[test]
    fn test_total_is_sum_of_included_entries() {
        let snapshot = LagSnapshot::from_partitions(
            "orders",
            "billing",
            vec![PartitionLag::new(1, 5, 9), PartitionLag::new(0, 0, 3)],
        );
        assert_eq!(snapshot.total_lag, 7);
        assert_eq!(snapshot.partition_lags[0].partition, 0);
    }

    #[test]
    fn test_json_keeps_wire_field_names() {
        let snapshot = LagSnapshot::from_partitions("orders", "billing", vec![PartitionLag::new(0, 2, 5)]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["total_lag"], 3);
        assert_eq!(json["partition_lags"][0]["current_offset"], 2);
        assert_eq!(json["partition_lags"][0]["log_end_offset"], 5);
    }
}
