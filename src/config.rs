use std::env;
use std::time::Duration;

// --- CONFIG AGGREGATOR ---

/// Built once at startup and handed to `BridgeEngine::new`; nothing reads the
/// environment after that.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub stream: StreamConfig,
    pub lag: LagConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            server: ServerConfig::load()?,
            kafka: KafkaConfig::load()?,
            stream: StreamConfig::load()?,
            lag: LagConfig::load()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {} must be valid (got '{}')", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl ServerConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host:      get_env("SERVER_HOST", "0.0.0.0")?,
            port:      get_env("PORT", "8080")?,
            log_level: get_env("BRIDGE_LOG", "info")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

// KAFKA
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma separated bootstrap list.
    pub brokers: String,
    pub client_timeout_ms: u64,
    pub session_timeout_ms: u64,
    pub produce_timeout_ms: u64,
    pub batch_produce_timeout_ms: u64,
    /// group.id for group-less partition readers (never commits).
    pub pull_group: String,
    /// group.id for metadata-only clients (never commits).
    pub metadata_group: String,
}

impl KafkaConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            brokers:                  get_env("KAFKA_BROKERS", "localhost:9092")?,
            client_timeout_ms:        get_env("KAFKA_CLIENT_TIMEOUT_MS", "5000")?,
            session_timeout_ms:       get_env("KAFKA_SESSION_TIMEOUT_MS", "6000")?,
            produce_timeout_ms:       get_env("KAFKA_PRODUCE_TIMEOUT_MS", "10000")?,
            batch_produce_timeout_ms: get_env("KAFKA_BATCH_TIMEOUT_MS", "30000")?,
            pull_group:               get_env("KAFKA_PULL_GROUP", "kafka-bridge-pull")?,
            metadata_group:           get_env("KAFKA_METADATA_GROUP", "kafka-bridge-metadata")?,
        })
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_timeout_ms: 5000,
            session_timeout_ms: 6000,
            produce_timeout_ms: 10_000,
            batch_produce_timeout_ms: 30_000,
            pull_group: "kafka-bridge-pull".to_string(),
            metadata_group: "kafka-bridge-metadata".to_string(),
        }
    }
}

// STREAM
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub pull_max_records: usize,
    pub pull_deadline_ms: u64,
    pub keepalive_secs: u64,
    /// Pause after a recoverable broker read error in duplex sessions.
    pub read_retry_ms: u64,
    pub sse_buffer: usize,
    pub duplex_group: String,
    pub event_group: String,
}

impl StreamConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            pull_max_records: get_env_nonzero("STREAM_PULL_MAX_RECORDS", "10")?,
            pull_deadline_ms: get_env_nonzero("STREAM_PULL_DEADLINE_MS", "5000")?,
            keepalive_secs:   get_env_nonzero("STREAM_KEEPALIVE_SECS", "30")?,
            read_retry_ms:    get_env("STREAM_READ_RETRY_MS", "250")?,
            sse_buffer:       get_env("STREAM_SSE_BUFFER", "64")?,
            duplex_group:     get_env("STREAM_DUPLEX_GROUP", "default-group")?,
            event_group:      get_env("STREAM_EVENT_GROUP", "streaming-group")?,
        })
    }

    pub fn pull_deadline(&self) -> Duration {
        Duration::from_millis(self.pull_deadline_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pull_max_records: 10,
            pull_deadline_ms: 5000,
            keepalive_secs: 30,
            read_retry_ms: 250,
            sse_buffer: 64,
            duplex_group: "default-group".to_string(),
            event_group: "streaming-group".to_string(),
        }
    }
}

// LAG
#[derive(Debug, Clone)]
pub struct LagConfig {
    /// Per-partition deadline for the committed offset fetch.
    pub lookup_timeout_ms: u64,
}

impl LagConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            lookup_timeout_ms: get_env("LAG_LOOKUP_TIMEOUT_MS", "5000")?,
        })
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self { lookup_timeout_ms: 5000 }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError {
        key: key.to_string(),
        value,
    })
}

/// Like `get_env`, but `0` is rejected too.
fn get_env_nonzero<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let value: T = get_env(key, default)?;
    if value == T::default() {
        return Err(ConfigError {
            key: key.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_falls_back_to_default() {
        let value: u64 = get_env("KAFKA_BRIDGE_TEST_UNSET_KEY", "42").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_get_env_rejects_malformed_values() {
        env::set_var("KAFKA_BRIDGE_TEST_BAD_PORT", "eighty");
        let err = get_env::<u16>("KAFKA_BRIDGE_TEST_BAD_PORT", "8080").unwrap_err();
        assert_eq!(err.key, "KAFKA_BRIDGE_TEST_BAD_PORT");
        assert_eq!(err.value, "eighty");
        env::remove_var("KAFKA_BRIDGE_TEST_BAD_PORT");
    }

    #[test]
    fn test_zero_keepalive_is_rejected() {
        env::set_var("KAFKA_BRIDGE_TEST_ZERO_KEEPALIVE", "0");
        let err = get_env_nonzero::<u64>("KAFKA_BRIDGE_TEST_ZERO_KEEPALIVE", "30").unwrap_err();
        assert_eq!(err.key, "KAFKA_BRIDGE_TEST_ZERO_KEEPALIVE");
        env::remove_var("KAFKA_BRIDGE_TEST_ZERO_KEEPALIVE");

        let value: u64 = get_env_nonzero("KAFKA_BRIDGE_TEST_UNSET_KEEPALIVE", "30").unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn test_defaults_match_documented_contract() {
        let config = Config::default();
        assert_eq!(config.stream.pull_max_records, 10);
        assert_eq!(config.stream.pull_deadline(), Duration::from_secs(5));
        assert_eq!(config.stream.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.stream.duplex_group, "default-group");
        assert_eq!(config.stream.event_group, "streaming-group");
        assert_eq!(config.kafka.brokers, "localhost:9092");
    }
}
