//! # Probe executors (C2)
//!
//! One executor per `EndpointKind`, each a pure function of
//! `(Endpoint, deadline) -> ProbeOutcomeDraft` plus the shared Kafka pool.
//! `upside_down` inversion happens in the scheduler (C5), not here, per
//! spec.md §4.2's closing paragraph — executors must not mutate the
//! endpoint or outcome log.

mod http;
mod kafka;
mod ping;
mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::kafka_pool::KafkaPool;
use crate::types::Endpoint;

/// The raw result of one probe execution, before `upside_down` inversion,
/// location/instance stamping, and storage.
#[derive(Debug, Clone)]
pub struct ProbeOutcomeDraft {
    pub is_ok: bool,
    pub response_time_ms: f64,
    pub failure_reason: Option<String>,
    pub metadata: Option<Value>,
}

impl ProbeOutcomeDraft {
    pub fn ok(response_time_ms: f64) -> Self {
        Self {
            is_ok: true,
            response_time_ms,
            failure_reason: None,
            metadata: None,
        }
    }

    pub fn ok_with_metadata(response_time_ms: f64, metadata: Value) -> Self {
        Self {
            is_ok: true,
            response_time_ms,
            failure_reason: None,
            metadata: Some(metadata),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            is_ok: false,
            response_time_ms: 0.0,
            failure_reason: Some(reason.into()),
            metadata: None,
        }
    }
}

#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        pool: &KafkaPool,
        deadline: Duration,
    ) -> ProbeOutcomeDraft;
}

pub use http::HttpProbe;
pub use kafka::{KafkaConsumerProbe, KafkaProducerProbe};
pub use ping::PingProbe;
pub use tcp::TcpProbe;

/// Dispatch to the executor matching `endpoint.kind()`.
pub fn executor_for(endpoint: &Endpoint) -> Box<dyn ProbeExecutor> {
    use crate::types::EndpointKind::*;
    match endpoint.kind() {
        Http => Box::new(HttpProbe),
        Ping => Box::new(PingProbe),
        Tcp => Box::new(TcpProbe),
        KafkaProducer => Box::new(KafkaProducerProbe),
        KafkaConsumer => Box::new(KafkaConsumerProbe),
    }
}

/// Default per-check timeout, per spec.md §5's timeout table.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
