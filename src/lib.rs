pub mod admin;
pub mod bridge;
pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod lag;
pub mod metrics;
pub mod offsets;

use std::sync::Arc;
use std::time::Instant;

use crate::admin::AdminService;
use crate::bridge::StreamBridge;
use crate::broker::{BrokerClient, ConnectionProvider};
use crate::config::Config;
use crate::lag::LagCalculator;
use crate::metrics::MetricsAggregator;
use crate::offsets::OffsetReader;

// ========================================
// ENGINE
// ========================================

/// Wires every component to one `BrokerClient`.
/// Cheap to clone (all fields are Arcs or Arc-backed handles).
#[derive(Clone)]
pub struct BridgeEngine {
    pub config: Arc<Config>,
    pub provider: ConnectionProvider,
    pub offsets: OffsetReader,
    pub lag: Arc<LagCalculator>,
    pub metrics: Arc<MetricsAggregator>,
    pub bridge: StreamBridge,
    pub admin: Arc<AdminService>,
    pub start_time: Instant,
}

impl BridgeEngine {
    pub fn new(config: Config, client: Arc<dyn BrokerClient>) -> Self {
        let provider = ConnectionProvider::new(client.clone());
        let offsets = OffsetReader::new(client.clone());

        Self {
            lag: Arc::new(LagCalculator::new(provider.clone(), offsets.clone(), config.lag.clone())),
            metrics: Arc::new(MetricsAggregator::new(provider.clone(), offsets.clone())),
            bridge: StreamBridge::new(client, config.stream.clone()),
            admin: Arc::new(AdminService::new(provider.clone(), offsets.clone(), config.kafka.clone())),
            provider,
            offsets,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}
