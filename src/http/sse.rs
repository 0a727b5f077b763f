use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;

use crate::bridge::{ChannelSink, TransportKind};
use crate::http::handlers::required;
use crate::http::ws::StreamQuery;
use crate::BridgeEngine;

/// Event-stream transport. The session runs on its own task and feeds the
/// response body through a bounded channel; dropping the body ends it.
pub async fn consume_sse(State(engine): State<BridgeEngine>, Query(query): Query<StreamQuery>) -> Response {
    let topic = match required(query.topic, "topic") {
        Ok(topic) => topic,
        Err(e) => return e.into_response(),
    };

    let session = engine
        .bridge
        .open_session(&topic, query.group.as_deref(), TransportKind::PushOnly);
    let cancel = session.cancellation();
    let (sink, rx) = ChannelSink::new(engine.bridge.config().sse_buffer);
    let sink = Arc::new(sink);

    let bridge = engine.bridge.clone();
    tokio::spawn(async move {
        let watched = sink.clone();
        let watcher = tokio::spawn(async move {
            watched.client_gone().await;
            cancel.cancel();
        });
        bridge.run_event_stream(session, sink).await;
        watcher.abort();
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        let event = match frame.to_json() {
            Some(json) => Event::default().data(json),
            None => Event::default().comment("ping"),
        };
        Some((Ok::<_, Infallible>(event), rx))
    });

    Sse::new(events).into_response()
}
