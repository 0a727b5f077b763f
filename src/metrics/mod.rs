pub mod aggregator;
pub mod snapshot;

pub use aggregator::MetricsAggregator;
pub use snapshot::{ClusterSnapshot, PartitionSnapshot, PartitionSummary, TopicSnapshot, TopicSummary};
