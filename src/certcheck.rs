//! # Certificate and domain sub-check (C3)
//!
//! Independent from the probe executors (C2). TLS expiry opens a bare TLS
//! socket to `host:443` (or an explicit port embedded in the URL) with
//! verification disabled, extracts the leaf certificate's `not_after`, and
//! reports days remaining. Domain expiry is via RDAP, with a 24h-cached IANA
//! DNS bootstrap file.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{error, warn};
use url::Url;
use x509_parser::prelude::*;

use crate::error::{MonitorError, MonitorResult};
use crate::notifier::NotifierDispatcher;
use crate::types::{Endpoint, EndpointDetail};

const IANA_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/dns.json";
const IANA_BOOTSTRAP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const RDAP_TIMEOUT: Duration = Duration::from_secs(15);
const IANA_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const TLS_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub not_after: DateTime<Utc>,
    pub days_remaining: i64,
}

#[derive(Debug, Clone)]
pub struct DomainInfo {
    pub creation_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub registrar: Option<String>,
}

/// Opens a TLS socket to `host:port` with verification disabled and reads
/// the leaf certificate's expiry. TLS errors are the caller's to log; they
/// are never promoted to an endpoint DOWN state (spec.md §4.3).
pub async fn check_cert_expiry(host: &str, port: u16) -> MonitorResult<CertificateInfo> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| MonitorError::Config(format!("tls connector: {e}")))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tcp = timeout(TLS_CHECK_TIMEOUT, tokio::net::TcpStream::connect((host, port)))
        .await
        .map_err(|_| MonitorError::Config("tls connect timeout".into()))?
        .map_err(|e| MonitorError::Config(format!("tls connect: {e}")))?;

    let tls_stream = timeout(TLS_CHECK_TIMEOUT, connector.connect(host, tcp))
        .await
        .map_err(|_| MonitorError::Config("tls handshake timeout".into()))?
        .map_err(|e| MonitorError::Config(format!("tls handshake: {e}")))?;

    let der = tls_stream
        .get_ref()
        .peer_certificate()
        .map_err(|e| MonitorError::Config(format!("tls cert: {e}")))?
        .ok_or_else(|| MonitorError::Config("no peer certificate".into()))?
        .to_der()
        .map_err(|e| MonitorError::Config(format!("tls cert der: {e}")))?;

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| MonitorError::Config(format!("x509 parse: {e}")))?;
    let not_after = cert.validity().not_after;
    let not_after = DateTime::<Utc>::from_timestamp(not_after.timestamp(), 0)
        .ok_or_else(|| MonitorError::Config("bad cert not_after".into()))?;
    let days_remaining = (not_after - Utc::now()).num_days();

    Ok(CertificateInfo {
        not_after,
        days_remaining,
    })
}

/// One check of `endpoint`'s TLS expiry, notifying C7 if inside the
/// configured threshold.
pub async fn run_cert_check(endpoint: &Endpoint, notifier: &NotifierDispatcher) {
    let EndpointDetail::Http {
        check_cert_expiry,
        cert_expiry_threshold_days,
        ..
    } = &endpoint.detail
    else {
        return;
    };
    if !check_cert_expiry {
        return;
    }
    let Ok(url) = Url::parse(&endpoint.url) else {
        warn!(endpoint = endpoint.id, "cert check: bad url");
        return;
    };
    let Some(host) = url.host_str() else {
        warn!(endpoint = endpoint.id, "cert check: no host");
        return;
    };
    let port = url.port().unwrap_or(443);

    match check_cert_expiry(host, port).await {
        Ok(info) if info.days_remaining <= *cert_expiry_threshold_days as i64 => {
            notifier
                .notify_message(
                    endpoint,
                    format!(
                        "certificate for {host} expires in {} day(s)",
                        info.days_remaining
                    ),
                )
                .await;
        }
        Ok(_) => {}
        Err(e) => {
            error!(endpoint = endpoint.id, error = %e, "tls cert check failed");
        }
    }
}

/// Caches the IANA DNS RDAP bootstrap file for 24h.
#[derive(Debug, Default)]
pub struct RdapBootstrapCache {
    cached: RwLock<Option<(tokio::time::Instant, Arc<serde_json::Value>)>>,
}

impl RdapBootstrapCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, client: &reqwest::Client) -> MonitorResult<Arc<serde_json::Value>> {
        if let Some((fetched_at, value)) = self.cached.read().await.clone() {
            if fetched_at.elapsed() < IANA_BOOTSTRAP_TTL {
                return Ok(value);
            }
        }
        let value: serde_json::Value = timeout(
            IANA_FETCH_TIMEOUT,
            client.get(IANA_BOOTSTRAP_URL).send(),
        )
        .await
        .map_err(|_| MonitorError::Config("iana bootstrap timeout".into()))?
        .map_err(MonitorError::SyncTransport)?
        .json()
        .await
        .map_err(MonitorError::SyncTransport)?;
        let value = Arc::new(value);
        *self.cached.write().await = Some((tokio::time::Instant::now(), value.clone()));
        Ok(value)
    }

    fn rdap_base_for_tld<'a>(bootstrap: &'a serde_json::Value, tld: &str) -> Option<&'a str> {
        let services = bootstrap.get("services")?.as_array()?;
        for service in services {
            let entry = service.as_array()?;
            let tlds = entry.first()?.as_array()?;
            if tlds.iter().any(|t| t.as_str() == Some(tld)) {
                let urls = entry.get(1)?.as_array()?;
                return urls.first()?.as_str();
            }
        }
        None
    }
}

/// Looks up RDAP domain expiry for `root_domain` (e.g. `"example.com"`).
pub async fn lookup_domain(
    client: &reqwest::Client,
    cache: &RdapBootstrapCache,
    root_domain: &str,
) -> MonitorResult<DomainInfo> {
    let tld = root_domain
        .rsplit('.')
        .next()
        .ok_or_else(|| MonitorError::Validation("domain has no tld".into()))?;
    let bootstrap = cache.get(client).await?;
    let base = RdapBootstrapCache::rdap_base_for_tld(&bootstrap, tld)
        .ok_or_else(|| MonitorError::NotFound(format!("no rdap service for .{tld}")))?;
    let base = base.trim_end_matches('/');
    let url = format!("{base}/domain/{root_domain}");

    let body: serde_json::Value = timeout(RDAP_TIMEOUT, client.get(&url).send())
        .await
        .map_err(|_| MonitorError::Config("rdap timeout".into()))?
        .map_err(MonitorError::SyncTransport)?
        .json()
        .await
        .map_err(MonitorError::SyncTransport)?;

    let mut info = DomainInfo {
        creation_date: None,
        updated_date: None,
        expiry_date: None,
        registrar: None,
    };

    if let Some(events) = body.get("events").and_then(|e| e.as_array()) {
        for event in events {
            let action = event.get("eventAction").and_then(|v| v.as_str()).unwrap_or("");
            let date = event
                .get("eventDate")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            match action {
                "registration" => info.creation_date = date,
                "last changed" | "last updated" => info.updated_date = date,
                "expiration" => info.expiry_date = date,
                _ => {}
            }
        }
    }

    if let Some(entities) = body.get("entities").and_then(|e| e.as_array()) {
        for entity in entities {
            let roles = entity.get("roles").and_then(|r| r.as_array());
            let is_registrar = roles
                .map(|r| r.iter().any(|v| v.as_str() == Some("registrar")))
                .unwrap_or(false);
            if is_registrar {
                info.registrar = entity
                    .get("vcardArray")
                    .and_then(|v| v.as_array())
                    .and_then(|v| v.get(1))
                    .and_then(|v| v.as_array())
                    .and_then(|fields| {
                        fields.iter().find_map(|f| {
                            let f = f.as_array()?;
                            if f.first()?.as_str() == Some("fn") {
                                f.get(3)?.as_str().map(|s| s.to_string())
                            } else {
                                None
                            }
                        })
                    });
                break;
            }
        }
    }

    Ok(info)
}
