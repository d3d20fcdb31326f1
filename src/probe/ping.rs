use std::time::{Duration, Instant};

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::time::timeout;

use crate::kafka_pool::KafkaPool;
use crate::types::Endpoint;

use super::{ProbeExecutor, ProbeOutcomeDraft};

pub struct PingProbe;

#[async_trait]
impl ProbeExecutor for PingProbe {
    async fn probe(&self, endpoint: &Endpoint, _pool: &KafkaPool, deadline: Duration) -> ProbeOutcomeDraft {
        let host = endpoint
            .url
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        let addr = match tokio::net::lookup_host((host, 0)).await {
            Ok(mut it) => match it.next() {
                Some(sa) => sa.ip(),
                None => return ProbeOutcomeDraft::fail("dns"),
            },
            Err(_) => return ProbeOutcomeDraft::fail("dns"),
        };

        let client = match Client::new(&Config::default()) {
            Ok(c) => c,
            Err(e) => return ProbeOutcomeDraft::fail(format!("connect {e}")),
        };
        let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
        let payload = [0u8; 56];

        let start = Instant::now();
        match timeout(deadline, pinger.ping(PingSequence(0), &payload)).await {
            Ok(Ok(_)) => ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => ProbeOutcomeDraft::fail(format!("connect {e}")),
            Err(_) => ProbeOutcomeDraft::fail("timeout"),
        }
    }
}
