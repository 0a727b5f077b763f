use std::process::ExitCode;
use std::sync::Arc;

use kafka_bridge::broker::BrokerClient;
use kafka_bridge::config::Config;
use kafka_bridge::BridgeEngine;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = BridgeEngine::new(config.clone(), broker_client(&config));

    tracing::info!("Kafka bridge v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = kafka_bridge::http::serve(engine).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(feature = "kafka")]
fn broker_client(config: &Config) -> Arc<dyn BrokerClient> {
    Arc::new(kafka_bridge::broker::kafka::KafkaBroker::new(config.kafka.clone()))
}

#[cfg(not(feature = "kafka"))]
fn broker_client(_config: &Config) -> Arc<dyn BrokerClient> {
    tracing::warn!("Built without the `kafka` feature: serving an empty in-memory cluster");
    Arc::new(kafka_bridge::broker::memory::MemoryBroker::new())
}
