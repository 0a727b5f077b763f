//! In-memory cluster implementing `BrokerClient`.
//!
//! Deterministic stand-in for a Kafka deployment: partition logs with real
//! offset progression, committed group offsets, and switches to make a
//! leader, a coordinator or the whole cluster fail on demand.
//! Group readers commit `offset + 1` as soon as a record is handed out.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::broker::{
    BrokerClient, BrokerDescriptor, BrokerError, ConsumedRecord, DeliveryReport, OutgoingRecord,
    PartitionDescriptor, RecordStream, StartOffset,
};

type PartitionKey = (String, i32);

struct PartitionLog {
    leader: i32,
    /// First retrievable offset. Moves forward on truncation.
    log_start: i64,
    /// Next offset to be written.
    log_end: i64,
    /// Keyed by offset so compaction can leave holes.
    records: BTreeMap<i64, ConsumedRecord>,
}

impl PartitionLog {
    fn new(leader: i32) -> Self {
        Self { leader, log_start: 0, log_end: 0, records: BTreeMap::new() }
    }
}

struct ClusterState {
    brokers: Vec<BrokerDescriptor>,
    controller: i32,
    topics: BTreeMap<String, Vec<PartitionLog>>,
    /// (group, topic, partition) -> next offset the group will read
    committed: HashMap<(String, String, i32), i64>,
    unreachable: bool,
    leaders_down: HashSet<PartitionKey>,
    first_offset_faults: HashSet<PartitionKey>,
    last_offset_faults: HashSet<PartitionKey>,
    commit_faults: HashSet<PartitionKey>,
    read_faults: HashMap<String, VecDeque<String>>,
    round_robin: usize,
}

struct Inner {
    state: Mutex<ClusterState>,
    changed: Notify,
}

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Single broker `1` at `localhost:9092`, acting as controller.
    pub fn new() -> Self {
        Self::with_brokers(vec![BrokerDescriptor {
            id: 1,
            host: "localhost".to_string(),
            port: 9092,
            rack: None,
        }])
    }

    /// The first broker is the controller and leads every partition.
    pub fn with_brokers(brokers: Vec<BrokerDescriptor>) -> Self {
        let controller = brokers.first().map(|b| b.id).unwrap_or(-1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ClusterState {
                    brokers,
                    controller,
                    topics: BTreeMap::new(),
                    committed: HashMap::new(),
                    unreachable: false,
                    leaders_down: HashSet::new(),
                    first_offset_faults: HashSet::new(),
                    last_offset_faults: HashSet::new(),
                    commit_faults: HashSet::new(),
                    read_faults: HashMap::new(),
                    round_robin: 0,
                }),
                changed: Notify::new(),
            }),
        }
    }

    // --- Simulation controls ---

    pub fn add_topic(&self, name: &str, partitions: i32) {
        let mut state = self.inner.state.lock();
        let leader = state.controller;
        let logs = (0..partitions.max(0)).map(|_| PartitionLog::new(leader)).collect();
        state.topics.insert(name.to_string(), logs);
    }

    /// Appends one record and returns its offset. Panics on an unknown partition.
    pub fn append(&self, topic: &str, partition: i32, key: impl Into<Bytes>, value: impl Into<Bytes>) -> i64 {
        let offset = {
            let mut state = self.inner.state.lock();
            let log = state
                .topics
                .get_mut(topic)
                .and_then(|logs| logs.get_mut(partition as usize))
                .unwrap_or_else(|| panic!("unknown partition {}/{}", topic, partition));
            append_to(log, topic, partition, key.into(), value.into())
        };
        self.inner.changed.notify_waiters();
        offset
    }

    pub fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) {
        self.inner
            .state
            .lock()
            .committed
            .insert((group.to_string(), topic.to_string(), partition), offset);
    }

    pub fn committed(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.inner
            .state
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Retention: drops everything below `offset`.
    pub fn truncate_before(&self, topic: &str, partition: i32, offset: i64) {
        let mut state = self.inner.state.lock();
        if let Some(log) = state.topics.get_mut(topic).and_then(|l| l.get_mut(partition as usize)) {
            log.log_start = log.log_start.max(offset).min(log.log_end);
            log.records = log.records.split_off(&log.log_start);
        }
    }

    /// Compaction: removes a single record, leaving the offsets untouched.
    pub fn compact(&self, topic: &str, partition: i32, offset: i64) {
        let mut state = self.inner.state.lock();
        if let Some(log) = state.topics.get_mut(topic).and_then(|l| l.get_mut(partition as usize)) {
            log.records.remove(&offset);
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.state.lock().unreachable = unreachable;
        self.inner.changed.notify_waiters();
    }

    /// Leader down: offset lookups, partition reads and writes fail.
    pub fn set_leader_down(&self, topic: &str, partition: i32, down: bool) {
        let key = (topic.to_string(), partition);
        let mut state = self.inner.state.lock();
        if down {
            state.leaders_down.insert(key);
        } else {
            state.leaders_down.remove(&key);
        }
    }

    pub fn fail_first_offset(&self, topic: &str, partition: i32) {
        self.inner.state.lock().first_offset_faults.insert((topic.to_string(), partition));
    }

    pub fn fail_last_offset(&self, topic: &str, partition: i32) {
        self.inner.state.lock().last_offset_faults.insert((topic.to_string(), partition));
    }

    pub fn fail_committed_fetch(&self, topic: &str, partition: i32) {
        self.inner.state.lock().commit_faults.insert((topic.to_string(), partition));
    }

    /// The next read on any reader of `topic` fails once with `message`.
    pub fn inject_read_error(&self, topic: &str, message: &str) {
        self.inner
            .state
            .lock()
            .read_faults
            .entry(topic.to_string())
            .or_default()
            .push_back(message.to_string());
        self.inner.changed.notify_waiters();
    }

    fn check_reachable(state: &ClusterState) -> Result<(), BrokerError> {
        if state.unreachable {
            return Err(BrokerError::unreachable("dial tcp: connection refused"));
        }
        Ok(())
    }

    fn check_leader(state: &ClusterState, topic: &str, partition: i32) -> Result<(), BrokerError> {
        Self::check_reachable(state)?;
        if state.leaders_down.contains(&(topic.to_string(), partition)) {
            return Err(BrokerError::unreachable(format!(
                "leader for {}/{} is not available",
                topic, partition
            )));
        }
        Ok(())
    }

    fn partition_log<'a>(state: &'a ClusterState, topic: &str, partition: i32) -> Result<&'a PartitionLog, BrokerError> {
        if partition < 0 {
            return Err(BrokerError::protocol("unknown topic or partition"));
        }
        state
            .topics
            .get(topic)
            .and_then(|logs| logs.get(partition as usize))
            .ok_or_else(|| BrokerError::protocol("unknown topic or partition"))
    }

    fn stream(&self, topic: &str, group: Option<&str>, positions: BTreeMap<i32, i64>) -> Box<dyn RecordStream> {
        Box::new(MemoryStream {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group: group.map(str::to_string),
            positions,
            next_partition: 0,
        })
    }
}

fn append_to(log: &mut PartitionLog, topic: &str, partition: i32, key: Bytes, value: Bytes) -> i64 {
    let offset = log.log_end;
    log.records.insert(
        offset,
        ConsumedRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key,
            value,
            produced_at: Utc::now(),
        },
    );
    log.log_end += 1;
    offset
}

fn key_partition(key: &[u8], partitions: usize) -> usize {
    let hash = key.iter().fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(*b as u32));
    hash as usize % partitions
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn dial(&self) -> Result<(), BrokerError> {
        Self::check_reachable(&self.inner.state.lock())
    }

    async fn read_partitions(&self, topic: Option<&str>) -> Result<Vec<PartitionDescriptor>, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_reachable(&state)?;
        let mut out = Vec::new();
        for (name, logs) in state.topics.iter() {
            if topic.is_some_and(|t| t != name.as_str()) {
                continue;
            }
            for (id, log) in logs.iter().enumerate() {
                let id = id as i32;
                let down = state.leaders_down.contains(&(name.clone(), id));
                out.push(PartitionDescriptor {
                    topic: name.clone(),
                    partition: id,
                    leader: log.leader,
                    replicas: vec![log.leader],
                    isr: if down { Vec::new() } else { vec![log.leader] },
                });
            }
        }
        Ok(out)
    }

    async fn list_brokers(&self) -> Result<Vec<BrokerDescriptor>, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_reachable(&state)?;
        Ok(state.brokers.clone())
    }

    async fn controller(&self) -> Result<BrokerDescriptor, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_reachable(&state)?;
        state
            .brokers
            .iter()
            .find(|b| b.id == state.controller)
            .cloned()
            .ok_or_else(|| BrokerError::protocol("no controller elected"))
    }

    async fn read_first_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_leader(&state, topic, partition)?;
        if state.first_offset_faults.contains(&(topic.to_string(), partition)) {
            return Err(BrokerError::timeout("list offsets (earliest) timed out"));
        }
        Ok(Self::partition_log(&state, topic, partition)?.log_start)
    }

    async fn read_last_offset(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_leader(&state, topic, partition)?;
        if state.last_offset_faults.contains(&(topic.to_string(), partition)) {
            return Err(BrokerError::timeout("list offsets (latest) timed out"));
        }
        Ok(Self::partition_log(&state, topic, partition)?.log_end)
    }

    async fn fetch_committed_offset(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>, BrokerError> {
        let state = self.inner.state.lock();
        Self::check_reachable(&state)?;
        if state.commit_faults.contains(&(topic.to_string(), partition)) {
            return Err(BrokerError::unreachable("group coordinator is not available"));
        }
        Ok(state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }

    async fn open_partition(&self, topic: &str, partition: i32, start: StartOffset) -> Result<Box<dyn RecordStream>, BrokerError> {
        let position = {
            let state = self.inner.state.lock();
            Self::check_leader(&state, topic, partition)?;
            let log = Self::partition_log(&state, topic, partition)?;
            match start {
                StartOffset::Earliest => log.log_start,
                StartOffset::Latest => log.log_end,
                StartOffset::At(offset) => offset,
            }
        };
        Ok(self.stream(topic, None, BTreeMap::from([(partition, position)])))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn RecordStream>, BrokerError> {
        let positions = {
            let state = self.inner.state.lock();
            Self::check_reachable(&state)?;
            let logs = state
                .topics
                .get(topic)
                .ok_or_else(|| BrokerError::protocol(format!("unknown topic '{}'", topic)))?;
            logs.iter()
                .enumerate()
                .map(|(id, log)| {
                    let id = id as i32;
                    let committed = state
                        .committed
                        .get(&(group.to_string(), topic.to_string(), id))
                        .copied();
                    (id, committed.unwrap_or(log.log_end))
                })
                .collect()
        };
        Ok(self.stream(topic, Some(group), positions))
    }

    async fn write_records(&self, topic: &str, records: Vec<OutgoingRecord>) -> Result<Vec<DeliveryReport>, BrokerError> {
        let reports = {
            let mut guard = self.inner.state.lock();
            Self::check_reachable(&guard)?;
            let state: &mut ClusterState = &mut guard;
            let logs = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::protocol(format!("unknown topic '{}'", topic)))?;
            let count = logs.len();
            if count == 0 {
                return Err(BrokerError::protocol(format!("topic '{}' has no partitions", topic)));
            }

            let mut reports = Vec::with_capacity(records.len());
            for record in records {
                let partition = match record.partition {
                    Some(p) if p >= 0 && (p as usize) < count => p as usize,
                    Some(p) => return Err(BrokerError::protocol(format!("unknown partition {}", p))),
                    None if !record.key.is_empty() => key_partition(&record.key, count),
                    None => {
                        state.round_robin = state.round_robin.wrapping_add(1);
                        state.round_robin % count
                    }
                };
                if state.leaders_down.contains(&(topic.to_string(), partition as i32)) {
                    return Err(BrokerError::unreachable(format!(
                        "leader for {}/{} is not available",
                        topic, partition
                    )));
                }
                let offset = append_to(&mut logs[partition], topic, partition as i32, record.key, record.value);
                reports.push(DeliveryReport { partition: partition as i32, offset });
            }
            reports
        };
        self.inner.changed.notify_waiters();
        Ok(reports)
    }

    async fn create_topic(&self, name: &str, partitions: i32, _replication_factor: i32) -> Result<(), BrokerError> {
        {
            let state = self.inner.state.lock();
            Self::check_reachable(&state)?;
            if state.topics.contains_key(name) {
                return Err(BrokerError::protocol(format!("topic '{}' already exists", name)));
            }
            if partitions < 1 {
                return Err(BrokerError::protocol("invalid number of partitions"));
            }
        }
        self.add_topic(name, partitions);
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.inner.state.lock();
            Self::check_reachable(&state)?;
            if state.topics.remove(name).is_none() {
                return Err(BrokerError::protocol(format!("unknown topic '{}'", name)));
            }
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }
}

// ========================================
// RECORD STREAM
// ========================================

struct MemoryStream {
    inner: Arc<Inner>,
    topic: String,
    group: Option<String>,
    /// Next offset to hand out, per partition.
    positions: BTreeMap<i32, i64>,
    /// Index into `positions` where the next poll starts, so a busy
    /// partition cannot starve the others.
    next_partition: usize,
}

impl MemoryStream {
    fn poll_once(&mut self) -> Option<Result<ConsumedRecord, BrokerError>> {
        let mut guard = self.inner.state.lock();
        let state: &mut ClusterState = &mut guard;
        if state.unreachable {
            return Some(Err(BrokerError::unreachable("dial tcp: connection refused")));
        }
        if let Some(message) = state.read_faults.get_mut(&self.topic).and_then(|q| q.pop_front()) {
            return Some(Err(BrokerError::unreachable(message)));
        }
        let logs = match state.topics.get(&self.topic) {
            Some(logs) => logs,
            None => return Some(Err(BrokerError::protocol(format!("unknown topic '{}'", self.topic)))),
        };

        let partitions: Vec<i32> = self.positions.keys().copied().collect();
        let count = partitions.len();
        for step in 0..count {
            let index = (self.next_partition + step) % count;
            let partition = partitions[index];
            if state.leaders_down.contains(&(self.topic.clone(), partition)) {
                continue;
            }
            let log = match logs.get(partition as usize) {
                Some(log) => log,
                None => continue,
            };
            let position = match self.positions.get_mut(&partition) {
                Some(position) => position,
                None => continue,
            };
            if let Some((offset, record)) = log.records.range((*position).max(log.log_start)..).next() {
                let record = record.clone();
                *position = offset + 1;
                let committed = *position;
                self.next_partition = (index + 1) % count;
                if let Some(group) = &self.group {
                    state
                        .committed
                        .insert((group.clone(), self.topic.clone(), partition), committed);
                }
                return Some(Ok(record));
            }
        }
        None
    }
}

#[async_trait]
impl RecordStream for MemoryStream {
    async fn next_record(&mut self) -> Result<ConsumedRecord, BrokerError> {
        let inner = self.inner.clone();
        loop {
            // Registered before polling so an append in between is not missed.
            let changed = inner.changed.notified();
            if let Some(result) = self.poll_once() {
                return result;
            }
            changed.await;
        }
    }
}
