//! Full-duplex session: a keepalive task and a consumption task sharing one
//! cancellation token. Whichever ends first takes the other down with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bridge::session::{SessionEnd, StreamSession};
use crate::bridge::sink::{Frame, PushSink, RecordFrame};
use crate::bridge::StreamBridge;
use crate::broker::RecordStream;

impl StreamBridge {
    pub async fn run_duplex(&self, session: StreamSession, sink: Arc<dyn PushSink>) -> SessionEnd {
        let cancel = session.cancellation();
        let topic = session.topic().to_string();
        let group = session
            .group()
            .unwrap_or(self.config.duplex_group.as_str())
            .to_string();

        let subscribed = tokio::select! {
            _ = cancel.cancelled() => {
                sink.close().await;
                return self.finish(&session, SessionEnd::Cancelled);
            }
            result = self.client.subscribe(&topic, &group) => result,
        };
        let stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => {
                let message = format!("Failed to subscribe: {}", e);
                let _ = sink.send_frame(Frame::Error(message.clone())).await;
                sink.close().await;
                return self.finish(&session, SessionEnd::SubscribeFailed(message));
            }
        };

        let session = Arc::new(session);
        let mut keepalive = tokio::spawn(keepalive_loop(
            sink.clone(),
            cancel.clone(),
            self.config.keepalive_interval(),
        ));
        let mut consume = tokio::spawn(consume_loop(
            stream,
            sink.clone(),
            session.clone(),
            cancel.clone(),
            self.config.read_retry(),
        ));

        let (keepalive_end, consume_end) = tokio::select! {
            result = &mut keepalive => {
                cancel.cancel();
                (result, consume.await)
            }
            result = &mut consume => {
                cancel.cancel();
                (keepalive.await, result)
            }
        };

        // The task that raised cancellation carries the reason; the other
        // one only reports `Cancelled`.
        let end = [keepalive_end, consume_end]
            .into_iter()
            .map(|joined| match joined {
                Ok(end) => end,
                Err(e) => {
                    error!(session = %session.id(), error = %e, "Duplex task did not finish cleanly");
                    SessionEnd::TaskFailed(e.to_string())
                }
            })
            .find(|end| *end != SessionEnd::Cancelled)
            .unwrap_or(SessionEnd::Cancelled);

        sink.close().await;
        self.finish(&session, end)
    }
}

async fn keepalive_loop(sink: Arc<dyn PushSink>, cancel: CancellationToken, period: Duration) -> SessionEnd {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            _ = ticker.tick() => {}
        }
        let sent = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = sink.send_frame(Frame::Ping) => result,
        };
        if let Err(e) = sent {
            warn!(error = %e, "Keepalive ping failed");
            cancel.cancel();
            return SessionEnd::KeepaliveFailed;
        }
    }
}

async fn consume_loop(
    mut stream: Box<dyn RecordStream>,
    sink: Arc<dyn PushSink>,
    session: Arc<StreamSession>,
    cancel: CancellationToken,
    read_retry: Duration,
) -> SessionEnd {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = stream.next_record() => result,
        };

        let (frame, recovering) = match next {
            Ok(record) => {
                debug!(topic = %record.topic, partition = record.partition, offset = record.offset, "Forwarding record");
                (Frame::Record(RecordFrame::from(&record)), false)
            }
            Err(e) => {
                warn!(session = %session.id(), error = %e, "Broker read failed, session continues");
                (Frame::Error(format!("Failed to read message: {}", e)), true)
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = sink.send_frame(frame) => result,
        };
        if let Err(e) = sent {
            warn!(session = %session.id(), error = %e, "Client write failed");
            cancel.cancel();
            return SessionEnd::ClientGone;
        }

        if recovering {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = tokio::time::sleep(read_retry) => {}
            }
        } else {
            session.touch();
        }
    }
}
