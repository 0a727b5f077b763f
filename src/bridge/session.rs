//! Session registry. A `StreamSession` is a guard: dropping it deregisters
//! the session and raises its cancellation signal.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Duplex,
    PushOnly,
    BoundedPull,
}

/// Why a streaming session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    ClientGone,
    KeepaliveFailed,
    BrokerFailed(String),
    SubscribeFailed(String),
    /// A session task panicked or was aborted.
    TaskFailed(String),
}

impl SessionEnd {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionEnd::BrokerFailed(_) | SessionEnd::SubscribeFailed(_) | SessionEnd::TaskFailed(_)
        )
    }
}

struct SessionState {
    topic: String,
    group: Option<String>,
    transport: TransportKind,
    opened_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    delivered: AtomicU64,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub transport: TransportKind,
    pub opened_at: String,
    pub last_activity: String,
    pub delivered: u64,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, topic: &str, group: Option<&str>, transport: TransportKind) -> StreamSession {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let state = Arc::new(SessionState {
            topic: topic.to_string(),
            group: group.map(str::to_string),
            transport,
            opened_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            delivered: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });
        self.sessions.insert(id, state.clone());
        tracing::info!(session = %id, topic = %topic, transport = ?transport, "Session opened");
        StreamSession { id, state, registry: self.clone() }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| {
                let s = entry.value();
                SessionInfo {
                    id: *entry.key(),
                    topic: s.topic.clone(),
                    group: s.group.clone(),
                    transport: s.transport,
                    opened_at: s.opened_at.to_rfc3339(),
                    last_activity: Utc
                        .timestamp_millis_opt(s.last_activity_ms.load(Ordering::Relaxed))
                        .single()
                        .unwrap_or(s.opened_at)
                        .to_rfc3339(),
                    delivered: s.delivered.load(Ordering::Relaxed),
                }
            })
            .collect();
        list.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        list
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove(&self, id: &Uuid) {
        self.sessions.remove(id);
    }
}

pub struct StreamSession {
    id: Uuid,
    state: Arc<SessionState>,
    registry: SessionRegistry,
}

impl StreamSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.state.topic
    }

    pub fn group(&self) -> Option<&str> {
        self.state.group.as_deref()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    /// Marks one record as forwarded to the client.
    pub fn touch(&self) {
        self.state.last_activity_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.state.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.state.cancel.cancel();
        self.registry.remove(&self.id);
        tracing::debug!(session = %self.id, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_deregisters_and_cancels() {
        let registry = SessionRegistry::new();
        let session = registry.open("orders", Some("g"), TransportKind::Duplex);
        let token = session.cancellation();
        assert_eq!(registry.len(), 1);

        session.touch();
        assert_eq!(registry.list()[0].delivered, 1);

        drop(session);
        assert!(registry.is_empty());
        assert!(token.is_cancelled());
    }
}
