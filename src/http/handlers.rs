//! REST handlers. Query parameters arrive as optional strings and are parsed
//! here so malformed input gets the same `{"error": ...}` body as any other
//! validation failure.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::{
    BatchResult, BrokerList, ClusterInfo, CreateTopicRequest, ProduceBatchRequest, ProduceRequest,
    ProduceResult, TopicChange, TopicDetails, TopicList,
};
use crate::bridge::{PullRequest, PullResult, SessionInfo};
use crate::error::{BridgeError, BridgeResult};
use crate::lag::LagSnapshot;
use crate::metrics::{ClusterSnapshot, PartitionSnapshot, TopicSnapshot};
use crate::BridgeEngine;

#[derive(Debug, Deserialize)]
pub struct ConsumeQuery {
    pub topic: Option<String>,
    pub partition: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LagQuery {
    pub topic: Option<String>,
    pub group: Option<String>,
}

#[derive(Serialize)]
pub struct SessionList {
    sessions: Vec<SessionInfo>,
    count: usize,
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    kafka: String,
    uptime_seconds: u64,
}

pub(crate) fn required(value: Option<String>, name: &str) -> BridgeResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::validation(format!("{} is required", name)))
}

fn parse_optional<T: std::str::FromStr>(value: Option<String>, name: &str) -> BridgeResult<Option<T>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| BridgeError::validation(format!("invalid {}", name))),
    }
}

// --- Streaming (bounded) ---

pub async fn consume(
    State(engine): State<BridgeEngine>,
    Query(query): Query<ConsumeQuery>,
) -> BridgeResult<Json<PullResult>> {
    let topic = required(query.topic, "topic")?;
    let partition = parse_optional::<i32>(query.partition, "partition")?.unwrap_or(0);
    let offset = parse_optional::<i64>(query.offset, "offset")?;

    let result = engine
        .bridge
        .bounded_pull(PullRequest { topic, partition, offset })
        .await?;
    Ok(Json(result))
}

pub async fn list_sessions(State(engine): State<BridgeEngine>) -> Json<SessionList> {
    let sessions = engine.bridge.sessions().list();
    Json(SessionList { count: sessions.len(), sessions })
}

// --- Metrics ---

pub async fn lag(
    State(engine): State<BridgeEngine>,
    Query(query): Query<LagQuery>,
) -> BridgeResult<Json<LagSnapshot>> {
    let topic = query.topic.unwrap_or_default();
    let group = query.group.unwrap_or_default();
    Ok(Json(engine.lag.compute_lag(&topic, &group).await?))
}

pub async fn cluster_metrics(State(engine): State<BridgeEngine>) -> BridgeResult<Json<ClusterSnapshot>> {
    Ok(Json(engine.metrics.cluster_snapshot().await?))
}

pub async fn topic_metrics(
    State(engine): State<BridgeEngine>,
    Path(topic): Path<String>,
) -> BridgeResult<Json<TopicSnapshot>> {
    Ok(Json(engine.metrics.topic_snapshot(&topic).await?))
}

pub async fn partition_metrics(
    State(engine): State<BridgeEngine>,
    Path((topic, partition)): Path<(String, String)>,
) -> BridgeResult<Json<PartitionSnapshot>> {
    let partition: i32 = partition
        .parse()
        .map_err(|_| BridgeError::validation("invalid partition"))?;
    Ok(Json(engine.metrics.partition_snapshot(&topic, partition).await?))
}

// --- Producer ---

pub async fn produce(
    State(engine): State<BridgeEngine>,
    payload: Result<Json<ProduceRequest>, JsonRejection>,
) -> BridgeResult<Json<ProduceResult>> {
    let Json(request) = payload?;
    Ok(Json(engine.admin.produce(request).await?))
}

pub async fn produce_batch(
    State(engine): State<BridgeEngine>,
    payload: Result<Json<ProduceBatchRequest>, JsonRejection>,
) -> BridgeResult<Json<BatchResult>> {
    let Json(request) = payload?;
    Ok(Json(engine.admin.produce_batch(request).await?))
}

// --- Admin ---

pub async fn list_topics(State(engine): State<BridgeEngine>) -> BridgeResult<Json<TopicList>> {
    Ok(Json(engine.admin.list_topics().await?))
}

pub async fn create_topic(
    State(engine): State<BridgeEngine>,
    payload: Result<Json<CreateTopicRequest>, JsonRejection>,
) -> BridgeResult<Json<TopicChange>> {
    let Json(request) = payload?;
    Ok(Json(engine.admin.create_topic(request).await?))
}

pub async fn topic_details(
    State(engine): State<BridgeEngine>,
    Path(name): Path<String>,
) -> BridgeResult<Json<TopicDetails>> {
    Ok(Json(engine.admin.topic_details(&name).await?))
}

pub async fn delete_topic(
    State(engine): State<BridgeEngine>,
    Path(name): Path<String>,
) -> BridgeResult<Json<TopicChange>> {
    Ok(Json(engine.admin.delete_topic(&name).await?))
}

pub async fn list_brokers(State(engine): State<BridgeEngine>) -> BridgeResult<Json<BrokerList>> {
    Ok(Json(engine.admin.list_brokers().await?))
}

pub async fn cluster_info(State(engine): State<BridgeEngine>) -> BridgeResult<Json<ClusterInfo>> {
    Ok(Json(engine.admin.cluster_info().await?))
}

pub async fn health(State(engine): State<BridgeEngine>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        kafka: engine.config.kafka.brokers.clone(),
        uptime_seconds: engine.start_time.elapsed().as_secs(),
    })
}
