//! Streaming Bridge: moves records from the broker to a client transport.
//!
//! Three modes share one `StreamBridge`:
//! - `bounded_pull`: a capped, deadline-bound read of one partition
//! - `run_duplex`: long-lived group session with keepalive (WebSocket)
//! - `run_event_stream`: long-lived server-push session (SSE)

pub mod bounded;
pub mod duplex;
pub mod event_stream;
pub mod session;
pub mod sink;

use std::sync::Arc;

use crate::broker::BrokerClient;
use crate::config::StreamConfig;

pub use bounded::{PullRequest, PullResult};
pub use session::{SessionEnd, SessionInfo, SessionRegistry, StreamSession, TransportKind};
pub use sink::{ChannelSink, Frame, PushSink, RecordFrame, SinkError};

#[derive(Clone)]
pub struct StreamBridge {
    client: Arc<dyn BrokerClient>,
    config: StreamConfig,
    sessions: SessionRegistry,
}

impl StreamBridge {
    pub fn new(client: Arc<dyn BrokerClient>, config: StreamConfig) -> Self {
        Self {
            client,
            config,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Registers a long-lived session. The group falls back to the
    /// transport's default group.
    pub fn open_session(&self, topic: &str, group: Option<&str>, transport: TransportKind) -> StreamSession {
        let group = match (group, transport) {
            (Some(g), _) if !g.is_empty() => Some(g),
            (_, TransportKind::Duplex) => Some(self.config.duplex_group.as_str()),
            (_, TransportKind::PushOnly) => Some(self.config.event_group.as_str()),
            (_, TransportKind::BoundedPull) => None,
        };
        self.sessions.open(topic, group, transport)
    }
}
