use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::bridge::session::TransportKind;
use crate::bridge::sink::RecordFrame;
use crate::bridge::StreamBridge;
use crate::broker::StartOffset;
use crate::error::{BridgeError, BridgeResult};

/// Offset aliases accepted on the wire.
pub const OFFSET_LATEST: i64 = -1;
pub const OFFSET_EARLIEST: i64 = -2;

#[derive(Debug, Clone)]
pub struct PullRequest {
    pub topic: String,
    pub partition: i32,
    /// `None` reads from the log end.
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullResult {
    pub messages: Vec<RecordFrame>,
    pub count: usize,
}

impl PullResult {
    fn new(messages: Vec<RecordFrame>) -> Self {
        Self { count: messages.len(), messages }
    }
}

fn start_offset(offset: Option<i64>) -> BridgeResult<StartOffset> {
    match offset {
        None | Some(OFFSET_LATEST) => Ok(StartOffset::Latest),
        Some(OFFSET_EARLIEST) => Ok(StartOffset::Earliest),
        Some(o) if o >= 0 => Ok(StartOffset::At(o)),
        Some(_) => Err(BridgeError::validation("invalid offset")),
    }
}

impl StreamBridge {
    /// Reads up to `pull_max_records` within `pull_deadline`. Hitting either
    /// limit is a success; any other read error discards what was collected.
    pub async fn bounded_pull(&self, request: PullRequest) -> BridgeResult<PullResult> {
        if request.topic.is_empty() {
            return Err(BridgeError::validation("topic is required"));
        }
        if request.partition < 0 {
            return Err(BridgeError::validation("invalid partition"));
        }
        let start = start_offset(request.offset)?;

        let session = self.open_session(&request.topic, None, TransportKind::BoundedPull);
        let deadline = Instant::now() + self.config.pull_deadline();
        let cap = self.config.pull_max_records;

        let opened = timeout_at(
            deadline,
            self.client.open_partition(&request.topic, request.partition, start),
        )
        .await;
        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if !e.is_timeout() => {
                warn!(topic = %request.topic, partition = request.partition, error = %e, "Bounded pull failed to open reader");
                return Err(BridgeError::Broker(e));
            }
            _ => return Ok(PullResult::new(Vec::new())),
        };

        let mut messages = Vec::with_capacity(cap);
        while messages.len() < cap {
            match timeout_at(deadline, stream.next_record()).await {
                Ok(Ok(record)) => {
                    session.touch();
                    messages.push(RecordFrame::from(&record));
                }
                Ok(Err(e)) if e.is_timeout() => break,
                Ok(Err(e)) => {
                    warn!(topic = %request.topic, partition = request.partition, error = %e, "Bounded pull aborted");
                    return Err(BridgeError::Broker(e));
                }
                Err(_) => break,
            }
        }

        debug!(topic = %request.topic, partition = request.partition, count = messages.len(), "Bounded pull done");
        Ok(PullResult::new(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_aliases() {
        assert_eq!(start_offset(None).unwrap(), StartOffset::Latest);
        assert_eq!(start_offset(Some(-1)).unwrap(), StartOffset::Latest);
        assert_eq!(start_offset(Some(-2)).unwrap(), StartOffset::Earliest);
        assert_eq!(start_offset(Some(42)).unwrap(), StartOffset::At(42));
        assert!(start_offset(Some(-3)).is_err());
    }
}
