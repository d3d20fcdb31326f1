use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::producer::FutureRecord;
use tokio::time::timeout;

use crate::kafka_pool::KafkaPool;
use crate::types::{Endpoint, EndpointDetail};

use super::{ProbeExecutor, ProbeOutcomeDraft};

pub struct KafkaProducerProbe;

#[async_trait]
impl ProbeExecutor for KafkaProducerProbe {
    async fn probe(&self, endpoint: &Endpoint, pool: &KafkaPool, deadline: Duration) -> ProbeOutcomeDraft {
        let EndpointDetail::KafkaProducer {
            topic,
            message,
            client_config,
            ..
        } = &endpoint.detail
        else {
            return ProbeOutcomeDraft::fail("endpoint is not kafka_producer");
        };

        let conn = match pool.open_producer(endpoint.id, &endpoint.url, client_config) {
            Ok(c) => c,
            Err(e) => return ProbeOutcomeDraft::fail(format!("connect {e}")),
        };
        let Some(producer) = &conn.producer else {
            return ProbeOutcomeDraft::fail("connect: no producer");
        };

        let payload = message.clone().unwrap_or_else(|| {
            format!("heartbeat endpoint={} at={}", endpoint.id, Utc::now().to_rfc3339())
        });

        let start = Instant::now();
        let record: FutureRecord<'_, str, str> = FutureRecord::to(topic).payload(&payload);
        match producer.send(record, deadline).await {
            Ok(_) => ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0),
            Err((e, _)) => {
                pool.cleanup(endpoint.id);
                ProbeOutcomeDraft::fail(format!("connect {e}"))
            }
        }
    }
}

pub struct KafkaConsumerProbe;

#[async_trait]
impl ProbeExecutor for KafkaConsumerProbe {
    async fn probe(&self, endpoint: &Endpoint, pool: &KafkaPool, deadline: Duration) -> ProbeOutcomeDraft {
        let EndpointDetail::KafkaConsumer {
            topic,
            client_config,
            auto_commit,
            single_shot,
            ..
        } = &endpoint.detail
        else {
            return ProbeOutcomeDraft::fail("endpoint is not kafka_consumer");
        };

        let start = Instant::now();

        if *single_shot {
            let conn = match pool.open_consumer(endpoint.id, &endpoint.url, client_config, topic, *auto_commit) {
                Ok(c) => c,
                Err(e) => return ProbeOutcomeDraft::fail(format!("connect {e}")),
            };
            let Some(consumer) = &conn.consumer else {
                return ProbeOutcomeDraft::fail("connect: no consumer");
            };
            let mut stream = consumer.stream();
            return match timeout(deadline, stream.next()).await {
                Ok(Some(Ok(msg))) => {
                    if !auto_commit {
                        if let Err(e) = consumer.commit_message(&msg, CommitMode::Sync) {
                            return ProbeOutcomeDraft::fail(format!("connect {e}"));
                        }
                    }
                    ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0)
                }
                Ok(Some(Err(e))) => ProbeOutcomeDraft::fail(format!("connect {e}")),
                // No message within the window is still OK per spec.md §4.2.
                Ok(None) | Err(_) => ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0),
            };
        }

        let conn = match pool.open_admin(endpoint.id, &endpoint.url, client_config) {
            Ok(c) => c,
            Err(e) => return ProbeOutcomeDraft::fail(format!("connect {e}")),
        };
        let Some(admin) = &conn.admin else {
            return ProbeOutcomeDraft::fail("connect: no admin client");
        };
        match admin.fetch_metadata(Some(topic), deadline) {
            Ok(_) => ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0),
            Err(e) => ProbeOutcomeDraft::fail(format!("connect {e}")),
        }
    }
}
