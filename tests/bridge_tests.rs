use std::sync::Arc;

use kafka_bridge::bridge::{ChannelSink, Frame, PullRequest, SessionEnd, TransportKind};
use kafka_bridge::error::BridgeError;
mod helpers;
use helpers::{fill, setup_engine};

mod bounded_pull {
    use super::*;

    fn pull(topic: &str, offset: Option<i64>) -> PullRequest {
        PullRequest { topic: topic.to_string(), partition: 0, offset }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_limits_result_to_ten() {
        let (engine, broker) = setup_engine();
        broker.add_topic("events", 1);
        fill(&broker, "events", 0, 15);

        let result = engine.bridge.bounded_pull(pull("events", Some(0))).await.unwrap();
        assert_eq!(result.count, 10);
        let offsets: Vec<i64> = result.messages.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fewer_records_complete_at_deadline() {
        let (engine, broker) = setup_engine();
        broker.add_topic("events", 1);
        fill(&broker, "events", 0, 3);

        let started = tokio::time::Instant::now();
        let result = engine.bridge.bounded_pull(pull("events", Some(-2))).await.unwrap();
        assert_eq!(result.count, 3);
        assert!(started.elapsed() >= std::time::Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_with_no_traffic_is_empty_success() {
        let (engine, broker) = setup_engine();
        broker.add_topic("events", 1);
        fill(&broker, "events", 0, 4);

        let result = engine.bridge.bounded_pull(pull("events", None)).await.unwrap();
        assert_eq!(result.count, 0);
        assert!(result.messages.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"messages": [], "count": 0}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_discards_partial_records() {
        let (engine, broker) = setup_engine();
        broker.add_topic("events", 1);
        fill(&broker, "events", 0, 2);

        let bridge = engine.bridge.clone();
        let handle = tokio::spawn(async move { bridge.bounded_pull(pull("events", Some(0))).await });
        tokio::task::yield_now().await;
        broker.inject_read_error("events", "not leader for partition");

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Broker(_)));
        assert!(engine.bridge.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_leader_is_an_error() {
        let (engine, broker) = setup_engine();
        broker.add_topic("events", 1);
        broker.set_leader_down("events", 0, true);

        assert!(engine.bridge.bounded_pull(pull("events", None)).await.is_err());
    }
}

mod duplex {
    use super::*;

    #[tokio::test]
    async fn test_read_error_yields_one_error_frame_and_loop_continues() {
        let (engine, broker) = setup_engine();
        broker.add_topic("orders", 1);
        broker.commit("default-group", "orders", 0, 0);
        broker.inject_read_error("orders", "leader moved");
        broker.append("orders", 0, "k1", "v1");

        let (sink, mut rx) = ChannelSink::new(16);
        let session = engine.bridge.open_session("orders", None, TransportKind::Duplex);
        let cancel = session.cancellation();
        let bridge = engine.bridge.clone();
        let handle = tokio::spawn(async move { bridge.run_duplex(session, Arc::new(sink)).await });

        match rx.recv().await {
            Some(Frame::Error(message)) => assert!(message.starts_with("Failed to read message")),
            other => panic!("expected error frame, got {:?}", other),
        }
        match rx.recv().await {
            Some(Frame::Record(record)) => {
                assert_eq!(record.key, "k1");
                assert_eq!(record.value, "v1");
            }
            other => panic!("expected record frame, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.bridge.sessions().len(), 1);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SessionEnd::Cancelled);
        assert!(engine.bridge.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_failure_ends_both_activities() {
        let (engine, broker) = setup_engine();
        broker.add_topic("orders", 1);

        let (sink, rx) = ChannelSink::new(4);
        drop(rx);

        let session = engine.bridge.open_session("orders", Some("ops"), TransportKind::Duplex);
        let token = session.cancellation();
        let end = engine.bridge.run_duplex(session, Arc::new(sink)).await;

        assert_eq!(end, SessionEnd::KeepaliveFailed);
        assert!(token.is_cancelled());
        assert!(engine.bridge.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_records_arrive_in_offset_order() {
        let (engine, broker) = setup_engine();
        broker.add_topic("orders", 1);
        broker.commit("default-group", "orders", 0, 0);
        fill(&broker, "orders", 0, 5);

        let (sink, mut rx) = ChannelSink::new(16);
        let session = engine.bridge.open_session("orders", None, TransportKind::Duplex);
        let cancel = session.cancellation();
        let bridge = engine.bridge.clone();
        let handle = tokio::spawn(async move { bridge.run_duplex(session, Arc::new(sink)).await });

        let mut offsets = Vec::new();
        while offsets.len() < 5 {
            if let Some(Frame::Record(record)) = rx.recv().await {
                offsets.push(record.offset);
            }
        }
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
        assert_eq!(broker.committed("default-group", "orders", 0), Some(5));

        cancel.cancel();
        handle.await.unwrap();
    }
}

mod event_stream {
    use super::*;

    #[tokio::test]
    async fn test_read_error_ends_session_without_further_frames() {
        let (engine, broker) = setup_engine();
        broker.add_topic("orders", 1);
        broker.commit("streaming-group", "orders", 0, 0);
        broker.append("orders", 0, "", "first");

        let (sink, mut rx) = ChannelSink::new(16);
        let session = engine.bridge.open_session("orders", None, TransportKind::PushOnly);
        assert_eq!(session.group(), Some("streaming-group"));
        let bridge = engine.bridge.clone();
        let handle = tokio::spawn(async move { bridge.run_event_stream(session, Arc::new(sink)).await });

        match rx.recv().await {
            Some(Frame::Record(record)) => assert_eq!(record.value, "first"),
            other => panic!("expected record frame, got {:?}", other),
        }

        broker.inject_read_error("orders", "broker went away");
        broker.append("orders", 0, "", "second");

        let end = handle.await.unwrap();
        assert!(matches!(end, SessionEnd::BrokerFailed(_)));
        assert!(rx.recv().await.is_none());
        assert!(engine.bridge.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_client_gone_ends_session() {
        let (engine, broker) = setup_engine();
        broker.add_topic("orders", 1);
        broker.commit("streaming-group", "orders", 0, 0);

        let (sink, rx) = ChannelSink::new(1);
        let session = engine.bridge.open_session("orders", None, TransportKind::PushOnly);
        let bridge = engine.bridge.clone();
        let handle = tokio::spawn(async move { bridge.run_event_stream(session, Arc::new(sink)).await });

        drop(rx);
        broker.append("orders", 0, "", "lost");

        assert_eq!(handle.await.unwrap(), SessionEnd::ClientGone);
    }
}
