//! Client configuration

use serde::Deserialize;
use std::time::Duration;

/// Configuration for a [`TsdbClient`](crate::TsdbClient)
///
/// # Defaults
/// - Connect timeout: 5 s
/// - Query timeout: 5 s
/// - Push queue capacity: 100
/// - Latest-measurement lookback: 3600 s
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on TCP connection establishment
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Bound on waiting for a query response
    #[serde(rename = "query_timeout_ms", with = "millis")]
    pub query_timeout: Duration,

    /// Push notifications buffered between the read loop and the callbacks
    pub push_queue_capacity: usize,

    /// Window searched by `get_latest_measurement`
    #[serde(rename = "latest_lookback_secs", with = "secs")]
    pub latest_lookback: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
            push_queue_capacity: 100,
            latest_lookback: Duration::from_secs(3600),
        }
    }
}

impl ClientConfig {
    /// Sets the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-query response timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the push queue capacity (at least 1)
    pub fn with_push_queue_capacity(mut self, capacity: usize) -> Self {
        self.push_queue_capacity = capacity.max(1);
        self
    }

    /// Sets the lookback window for latest-measurement queries
    pub fn with_latest_lookback(mut self, lookback: Duration) -> Self {
        self.latest_lookback = lookback;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.push_queue_capacity, 100);
        assert_eq!(config.latest_lookback, Duration::from_secs(3600));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_query_timeout(Duration::from_secs(30))
            .with_push_queue_capacity(0)
            .with_latest_lookback(Duration::from_secs(60));

        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.push_queue_capacity, 1);
        assert_eq!(config.latest_lookback, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"query_timeout_ms": 1500, "latest_lookback_secs": 600}"#)
                .unwrap();

        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.latest_lookback, Duration::from_secs(600));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.push_queue_capacity, 100);
    }
}
