use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Certificate, Identity};
use serde_json::json;

use crate::kafka_pool::KafkaPool;
use crate::types::{Endpoint, EndpointDetail};

use super::{ProbeExecutor, ProbeOutcomeDraft};

pub struct HttpProbe;

#[async_trait]
impl ProbeExecutor for HttpProbe {
    async fn probe(&self, endpoint: &Endpoint, _pool: &KafkaPool, deadline: Duration) -> ProbeOutcomeDraft {
        let EndpointDetail::Http {
            method,
            headers,
            body,
            ok_http_statuses,
            keyword_search,
            mtls,
            ..
        } = &endpoint.detail
        else {
            return ProbeOutcomeDraft::fail("endpoint is not http");
        };

        let client = match build_client(mtls.as_ref(), deadline) {
            Ok(c) => c,
            Err(e) => return ProbeOutcomeDraft::fail(format!("tls {e}")),
        };

        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => reqwest::Method::GET,
        };

        let mut builder = client.request(method, &endpoint.url).timeout(deadline);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timeout".to_string()
                } else if e.is_connect() {
                    "connect".to_string()
                } else if e.is_request() {
                    "dns".to_string()
                } else {
                    "connect".to_string()
                };
                return ProbeOutcomeDraft::fail(reason);
            }
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let status_code = response.status().as_u16();

        let status_ok = if ok_http_statuses.is_empty() {
            (200..300).contains(&status_code)
        } else {
            ok_http_statuses.contains(&status_code)
        };
        if !status_ok {
            return ProbeOutcomeDraft::fail(format!("status {status_code}"));
        }

        let mut metadata = json!({ "status_code": status_code });

        if let Some(keyword) = keyword_search {
            let text = match response.text().await {
                Ok(t) => t,
                Err(_) => return ProbeOutcomeDraft::fail("connect"),
            };
            if !text.contains(keyword.as_str()) {
                return ProbeOutcomeDraft::fail("missing_keyword");
            }
            metadata["keyword_matched"] = json!(true);
        }

        ProbeOutcomeDraft::ok_with_metadata(elapsed_ms, metadata)
    }
}

fn build_client(
    mtls: Option<&crate::types::MtlsConfig>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(mtls) = mtls {
        let mut pem = mtls.cert_pem.clone().into_bytes();
        pem.extend_from_slice(b"\n");
        pem.extend_from_slice(mtls.key_pem.as_bytes());
        let identity = Identity::from_pem(&pem)?;
        builder = builder.identity(identity);
        if let Some(ca) = &mtls.ca_pem {
            let cert = Certificate::from_pem(ca.as_bytes())?;
            builder = builder.add_root_certificate(cert);
        }
    }
    builder.build()
}
