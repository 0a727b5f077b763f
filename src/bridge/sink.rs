//! Transport-agnostic outbound side of a streaming session.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::broker::ConsumedRecord;

/// A consumed record as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFrame {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub value: String,
    pub timestamp: String,
}

impl From<&ConsumedRecord> for RecordFrame {
    fn from(record: &ConsumedRecord) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: String::from_utf8_lossy(&record.key).into_owned(),
            value: String::from_utf8_lossy(&record.value).into_owned(),
            timestamp: record.produced_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Record(RecordFrame),
    /// Recoverable problem, serialized as `{"error": "..."}`.
    Error(String),
    /// Liveness ping.
    Ping,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Frame {
    /// JSON text of the frame; `None` for `Ping`.
    pub fn to_json(&self) -> Option<String> {
        match self {
            Frame::Record(record) => serde_json::to_string(record).ok(),
            Frame::Error(message) => serde_json::to_string(&ErrorBody { error: message }).ok(),
            Frame::Ping => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client write failed: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

#[async_trait]
pub trait PushSink: Send + Sync {
    async fn send_frame(&self, frame: Frame) -> Result<(), SinkError>;

    /// Best effort. Called once when the session ends.
    async fn close(&self);
}

/// Sink backed by a bounded channel. The receiving half is drained by the
/// transport (SSE body) or by a test.
pub struct ChannelSink {
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { sender: Mutex::new(Some(tx)) }, rx)
    }

    /// Resolves once the receiver is gone (or the sink was closed).
    pub async fn client_gone(&self) {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            sender.closed().await;
        }
    }
}

#[async_trait]
impl PushSink for ChannelSink {
    async fn send_frame(&self, frame: Frame) -> Result<(), SinkError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| SinkError("sink closed".to_string()))?;
        sender
            .send(frame)
            .await
            .map_err(|_| SinkError("receiver dropped".to_string()))
    }

    async fn close(&self) {
        self.sender.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    #[test]
    fn test_record_frame_uses_lossy_text() {
        let record = ConsumedRecord {
            topic: "orders".to_string(),
            partition: 1,
            offset: 7,
            key: Bytes::new(),
            value: Bytes::from_static(b"ok \xff"),
            produced_at: Utc::now(),
        };
        let frame = RecordFrame::from(&record);
        assert_eq!(frame.key, "");
        assert_eq!(frame.value, "ok \u{fffd}");
    }

    #[test]
    fn test_error_frame_json() {
        let json = Frame::Error("boom".to_string()).to_json().unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
        assert!(Frame::Ping.to_json().is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_fails_after_receiver_drop() {
        let (sink, rx) = ChannelSink::new(4);
        sink.send_frame(Frame::Ping).await.unwrap();
        drop(rx);
        assert!(sink.send_frame(Frame::Ping).await.is_err());
        sink.client_gone().await;
    }
}
