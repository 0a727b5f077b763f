use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::http::{handlers, sse, ws};
use crate::BridgeEngine;

pub fn router(engine: BridgeEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);

    let api = Router::new()
        // Streaming
        .route("/consume", get(handlers::consume))
        .route("/consume/ws", get(ws::consume_ws))
        .route("/consume/stream", get(sse::consume_sse))
        .route("/sessions", get(handlers::list_sessions))
        // Metrics
        .route("/metrics/lag", get(handlers::lag))
        .route("/metrics/cluster", get(handlers::cluster_metrics))
        .route("/metrics/topics/{topic}", get(handlers::topic_metrics))
        .route("/metrics/topics/{topic}/partitions/{partition}", get(handlers::partition_metrics))
        // Producer
        .route("/produce", axum::routing::post(handlers::produce))
        .route("/produce/batch", axum::routing::post(handlers::produce_batch))
        // Admin
        .route("/topics", get(handlers::list_topics).post(handlers::create_topic))
        .route("/topics/{name}", get(handlers::topic_details).delete(handlers::delete_topic))
        .route("/brokers", get(handlers::list_brokers))
        .route("/cluster", get(handlers::cluster_info));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(engine)
}

pub async fn serve(engine: BridgeEngine) -> std::io::Result<()> {
    let addr = engine.config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Kafka bridge listening on http://{}", addr);
    tracing::info!("Kafka brokers: {}", engine.config.kafka.brokers);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
