//! WebSocket transport for duplex sessions.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Frame, PushSink, SinkError, TransportKind};
use crate::http::handlers::required;
use crate::BridgeEngine;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub topic: Option<String>,
    pub group: Option<String>,
}

struct WsSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl PushSink for WsSink {
    async fn send_frame(&self, frame: Frame) -> Result<(), SinkError> {
        let message = match frame {
            Frame::Ping => Message::Ping(Bytes::new()),
            frame => {
                let json = frame
                    .to_json()
                    .ok_or_else(|| SinkError("frame encoding failed".to_string()))?;
                Message::Text(json.into())
            }
        };
        self.sender
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| SinkError(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.sender.lock().await.close().await;
    }
}

/// Topic is checked before the upgrade so a bad request gets a JSON 400
/// whether or not it asked for a WebSocket.
pub async fn consume_ws(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(engine): State<BridgeEngine>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let topic = match required(query.topic, "topic") {
        Ok(topic) => topic,
        Err(e) => return e.into_response(),
    };
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_socket(engine, socket, topic, query.group)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_socket(engine: BridgeEngine, socket: WebSocket, topic: String, group: Option<String>) {
    let (sender, receiver) = socket.split();
    let session = engine
        .bridge
        .open_session(&topic, group.as_deref(), TransportKind::Duplex);

    let watcher = tokio::spawn(watch_inbound(receiver, session.cancellation()));

    let sink = Arc::new(WsSink { sender: Mutex::new(sender) });
    engine.bridge.run_duplex(session, sink).await;
    watcher.abort();
}

/// Inbound half only tells us when the client is gone: a Close frame, a
/// read error or end of stream cancels the session.
async fn watch_inbound<S, E>(mut receiver: S, cancel: CancellationToken)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_close_frame_cancels_session() {
        let cancel = CancellationToken::new();
        let inbound = stream::iter(vec![
            Ok::<_, axum::Error>(Message::Text("hello".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("after close".into())),
        ]);

        watch_inbound(inbound, cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_end_of_stream_cancels_session() {
        let cancel = CancellationToken::new();
        let inbound = stream::iter(vec![Ok::<_, axum::Error>(Message::Pong(Bytes::new()))]);

        watch_inbound(inbound, cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_open_inbound_keeps_session() {
        let cancel = CancellationToken::new();
        let inbound = stream::pending::<Result<Message, axum::Error>>();

        let watcher = tokio::spawn(watch_inbound(inbound, cancel.clone()));
        tokio::task::yield_now().await;
        assert!(!cancel.is_cancelled());
        watcher.abort();
    }
}
