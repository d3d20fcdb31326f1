use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::kafka_pool::KafkaPool;
use crate::types::{Endpoint, EndpointDetail};

use super::{ProbeExecutor, ProbeOutcomeDraft};

pub struct TcpProbe;

#[async_trait]
impl ProbeExecutor for TcpProbe {
    async fn probe(&self, endpoint: &Endpoint, _pool: &KafkaPool, deadline: Duration) -> ProbeOutcomeDraft {
        let EndpointDetail::Tcp { port } = &endpoint.detail else {
            return ProbeOutcomeDraft::fail("endpoint is not tcp");
        };
        let host = endpoint
            .url
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        let addr = format!("{host}:{port}");

        let start = Instant::now();
        match timeout(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => ProbeOutcomeDraft::ok(start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => ProbeOutcomeDraft::fail(format!("connect {e}")),
            Err(_) => ProbeOutcomeDraft::fail("timeout"),
        }
    }
}
