use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub timestamp: String,
    pub broker_count: usize,
    pub topic_count: usize,
    pub partition_count: usize,
    pub topics: Vec<TopicSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub partition_count: usize,
    pub total_messages: i64, // resolved partitions only
    pub total_size: i64,     // not measured, always 0
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSnapshot {
    pub topic: String,
    pub partition_count: usize,
    pub total_messages: i64,
    pub partitions: Vec<PartitionSummary>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub partition: i32,
    pub leader: i32,
    pub replicas: usize,
    pub isr: usize,
    pub first_offset: Option<i64>,
    pub last_offset: Option<i64>,
    pub message_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSnapshot {
    pub topic: String,
    pub partition: i32,
    pub first_offset: i64,
    pub last_offset: i64,
    pub message_count: i64,
    pub timestamp: String,
}
