use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::session::{SessionEnd, StreamSession};
use crate::bridge::sink::{Frame, PushSink, RecordFrame};
use crate::bridge::StreamBridge;

impl StreamBridge {
    /// Server-push session. Unlike duplex mode a broker read error ends it,
    /// and there is no keepalive.
    pub async fn run_event_stream(&self, session: StreamSession, sink: Arc<dyn PushSink>) -> SessionEnd {
        let cancel = session.cancellation();
        let topic = session.topic().to_string();
        let group = session
            .group()
            .unwrap_or(self.config.event_group.as_str())
            .to_string();

        let subscribed = tokio::select! {
            _ = cancel.cancelled() => Err(None),
            result = self.client.subscribe(&topic, &group) => result.map_err(Some),
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(cause) => {
                sink.close().await;
                let end = match cause {
                    Some(e) => SessionEnd::SubscribeFailed(e.to_string()),
                    None => SessionEnd::Cancelled,
                };
                return self.finish(&session, end);
            }
        };

        let end = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                result = stream.next_record() => result,
            };
            let record = match next {
                Ok(record) => record,
                Err(e) => break SessionEnd::BrokerFailed(e.to_string()),
            };
            debug!(topic = %record.topic, partition = record.partition, offset = record.offset, "Pushing event");

            let sent = tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                result = sink.send_frame(Frame::Record(RecordFrame::from(&record))) => result,
            };
            if sent.is_err() {
                break SessionEnd::ClientGone;
            }
            session.touch();
        };

        sink.close().await;
        self.finish(&session, end)
    }

    pub(crate) fn finish(&self, session: &StreamSession, end: SessionEnd) -> SessionEnd {
        if end.is_failure() {
            warn!(session = %session.id(), topic = %session.topic(), delivered = session.delivered(), end = ?end, "Session ended");
        } else {
            info!(session = %session.id(), topic = %session.topic(), delivered = session.delivered(), end = ?end, "Session ended");
        }
        end
    }
}
