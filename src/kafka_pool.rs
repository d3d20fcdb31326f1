//! # Kafka connection pool (C4)
//!
//! Long-lived producer/consumer/admin sockets keyed by endpoint id, mirroring
//! the teacher's `coordinator/kafka.rs` `ClientConfig` usage but scoped down
//! to exactly what the probe executors need: a fixed-identity producer, a
//! fixed-group consumer, and an admin client for metadata liveness checks.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use rdkafka::admin::AdminClient;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::FutureProducer;
use serde_json::Value;

use crate::error::{MonitorError, MonitorResult};

/// Timeout-like keys the source sanitizes by rejecting negative/non-finite
/// values, per spec.md §4.4 and the REDESIGN note in §9 (an explicit
/// allow-list rather than name-pattern filtering).
const TIMEOUT_KEYS: &[&str] = &[
    "connectionTimeout",
    "requestTimeout",
    "sessionTimeout",
    "heartbeatInterval",
    "transactionTimeout",
    "authenticationTimeout",
    "reauthenticationThreshold",
];

const TIMEOUT_KEY_TO_RDKAFKA: &[(&str, &str)] = &[
    ("connectionTimeout", "socket.connection.setup.timeout.ms"),
    ("requestTimeout", "request.timeout.ms"),
    ("sessionTimeout", "session.timeout.ms"),
    ("heartbeatInterval", "heartbeat.interval.ms"),
    ("transactionTimeout", "transaction.timeout.ms"),
    // authenticationTimeout / reauthenticationThreshold have no direct
    // rdkafka equivalent; they are validated and dropped rather than mapped.
];

/// Meta-keys that shadow library internals and must never reach `ClientConfig`.
const STRIP_KEYS: &[&str] = &["timeout", "createdAt", "created_at", "lastError", "connected"];

/// Sanitize a user-supplied Kafka client config: reject negative/non-finite
/// timeout values, strip meta-keys, and return a clean `ClientConfig` seeded
/// with `bootstrap.servers`.
pub fn sanitize_kafka_config(
    bootstrap_servers: &str,
    raw: &serde_json::Map<String, Value>,
) -> MonitorResult<ClientConfig> {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", bootstrap_servers);

    let timeout_keys: BTreeSet<&str> = TIMEOUT_KEYS.iter().copied().collect();
    for (key, value) in raw {
        if STRIP_KEYS.contains(&key.as_str()) {
            continue;
        }
        if timeout_keys.contains(key.as_str()) {
            let ms = value
                .as_f64()
                .ok_or_else(|| MonitorError::Validation(format!("{key} must be numeric")))?;
            if !ms.is_finite() || ms < 0.0 {
                // Strip invalid timeouts; the resulting config still opens
                // with library defaults, per spec.md's boundary behavior.
                continue;
            }
            if let Some((_, rdkafka_key)) = TIMEOUT_KEY_TO_RDKAFKA.iter().find(|(k, _)| *k == key) {
                config.set(rdkafka_key, format!("{}", ms as i64));
            }
            continue;
        }
        if let Some(s) = value.as_str() {
            config.set(key, s);
        } else {
            config.set(key, value.to_string());
        }
    }
    Ok(config)
}

pub struct KafkaConnection {
    pub producer: Option<FutureProducer>,
    pub consumer: Option<StreamConsumer>,
    pub admin: Option<AdminClient<DefaultClientContext>>,
    pub connected: bool,
    pub last_error: Option<String>,
}

impl std::fmt::Debug for KafkaConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConnection")
            .field("connected", &self.connected)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct KafkaPool {
    connections: DashMap<i64, Arc<KafkaConnection>>,
}

impl KafkaPool {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn get_producer(&self, endpoint_id: i64) -> Option<Arc<KafkaConnection>> {
        self.connections.get(&endpoint_id).map(|e| e.clone())
    }

    pub fn group_id(endpoint_id: i64) -> String {
        format!("monitor-app-{endpoint_id}")
    }

    /// Returns an existing healthy record, or opens and caches a new one.
    pub fn open_producer(
        &self,
        endpoint_id: i64,
        bootstrap_servers: &str,
        raw_config: &serde_json::Map<String, Value>,
    ) -> MonitorResult<Arc<KafkaConnection>> {
        if let Some(existing) = self.connections.get(&endpoint_id) {
            if existing.connected && existing.producer.is_some() {
                return Ok(existing.clone());
            }
        }
        let mut config = sanitize_kafka_config(bootstrap_servers, raw_config)?;
        // Non-idempotent, single in-flight request per spec.md §4.4.
        config.set("max.in.flight.requests.per.connection", "1");
        config.set("enable.idempotence", "false");
        let producer: FutureProducer = config
            .create()
            .map_err(|e| MonitorError::Config(format!("kafka producer: {e}")))?;
        let conn = Arc::new(KafkaConnection {
            producer: Some(producer),
            consumer: None,
            admin: None,
            connected: true,
            last_error: None,
        });
        self.connections.insert(endpoint_id, conn.clone());
        Ok(conn)
    }

    pub fn open_consumer(
        &self,
        endpoint_id: i64,
        bootstrap_servers: &str,
        raw_config: &serde_json::Map<String, Value>,
        topic: &str,
        auto_commit: bool,
    ) -> MonitorResult<Arc<KafkaConnection>> {
        if let Some(existing) = self.connections.get(&endpoint_id) {
            if existing.connected && existing.consumer.is_some() {
                return Ok(existing.clone());
            }
        }
        let mut config = sanitize_kafka_config(bootstrap_servers, raw_config)?;
        config.set("group.id", Self::group_id(endpoint_id));
        config.set("enable.auto.commit", auto_commit.to_string());
        config.set("auto.offset.reset", "earliest");
        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| MonitorError::Config(format!("kafka consumer: {e}")))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| MonitorError::Config(format!("kafka subscribe: {e}")))?;
        let conn = Arc::new(KafkaConnection {
            producer: None,
            consumer: Some(consumer),
            admin: None,
            connected: true,
            last_error: None,
        });
        self.connections.insert(endpoint_id, conn.clone());
        Ok(conn)
    }

    pub fn open_admin(
        &self,
        endpoint_id: i64,
        bootstrap_servers: &str,
        raw_config: &serde_json::Map<String, Value>,
    ) -> MonitorResult<Arc<KafkaConnection>> {
        if let Some(existing) = self.connections.get(&endpoint_id) {
            if existing.connected && existing.admin.is_some() {
                return Ok(existing.clone());
            }
        }
        let config = sanitize_kafka_config(bootstrap_servers, raw_config)?;
        let admin: AdminClient<DefaultClientContext> = config
            .create()
            .map_err(|e| MonitorError::Config(format!("kafka admin: {e}")))?;
        let conn = Arc::new(KafkaConnection {
            producer: None,
            consumer: None,
            admin: Some(admin),
            connected: true,
            last_error: None,
        });
        self.connections.insert(endpoint_id, conn.clone());
        Ok(conn)
    }

    /// Disconnect and remove the pooled record for an endpoint.
    pub fn cleanup(&self, endpoint_id: i64) {
        self.connections.remove(&endpoint_id);
    }

    pub fn is_connected(&self, endpoint_id: i64) -> bool {
        self.connections
            .get(&endpoint_id)
            .map(|c| c.connected)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_negative_timeout() {
        let raw = json!({ "connectionTimeout": -5, "requestTimeout": 3000 });
        let raw = raw.as_object().unwrap();
        let config = sanitize_kafka_config("broker:9092", raw).unwrap();
        // connectionTimeout silently dropped; requestTimeout mapped through.
        assert!(config.get("socket.connection.setup.timeout.ms").is_none());
        assert_eq!(config.get("request.timeout.ms"), Some("3000"));
    }

    #[test]
    fn strips_meta_keys() {
        let raw = json!({ "timeout": 1, "createdAt": "now" });
        let raw = raw.as_object().unwrap();
        let config = sanitize_kafka_config("broker:9092", raw).unwrap();
        assert!(config.get("timeout").is_none());
        assert!(config.get("createdAt").is_none());
    }
}
