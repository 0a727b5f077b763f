#![allow(dead_code)]

use std::sync::Arc;

use kafka_bridge::broker::memory::MemoryBroker;
use kafka_bridge::config::Config;
use kafka_bridge::BridgeEngine;

/// Defaults, except for a short read-retry pause.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.stream.read_retry_ms = 10;
    config
}

pub fn setup_engine() -> (BridgeEngine, MemoryBroker) {
    setup_engine_with(test_config())
}

pub fn setup_engine_with(config: Config) -> (BridgeEngine, MemoryBroker) {
    let broker = MemoryBroker::new();
    let engine = BridgeEngine::new(config, Arc::new(broker.clone()));
    (engine, broker)
}

/// Appends `count` records `v0..` to one partition.
pub fn fill(broker: &MemoryBroker, topic: &str, partition: i32, count: usize) {
    for i in 0..count {
        broker.append(topic, partition, "", format!("v{}", i));
    }
}
