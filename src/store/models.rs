//! Row shapes for every table in `migrations/001_initial_schema.sql`, one
//! `*Row` struct per table with `#[derive(FromRow)]`, following the
//! teacher's `storage/models.rs` pattern. Boolean columns are `i64` here and
//! normalized to `bool` in the `TryFrom` conversions below, per spec.md's
//! "Boolean coercion at the persistence boundary" design note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{MonitorError, MonitorResult};
use crate::types::{
    AggregatedResult, Consensus, Endpoint, EndpointDetail, EndpointKind, InstanceId,
    InstanceStatus, InstanceToken, LocationResult, MonitoringInstance, ProbeOutcome, Status,
    SystemInfo,
};

#[derive(Debug, Clone, FromRow)]
pub struct EndpointRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub url: String,
    pub heartbeat_interval_seconds: i64,
    pub retries: i64,
    pub upside_down: i64,
    pub paused: i64,
    pub retries_failed_so_far: i64,
    pub status: String,
    pub last_checked: Option<String>,
    pub detail_json: String,
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = MonitorError;

    fn try_from(row: EndpointRow) -> MonitorResult<Self> {
        let detail: EndpointDetail = serde_json::from_str(&row.detail_json)?;
        let status = parse_status(&row.status);
        let last_checked = row
            .last_checked
            .map(|s| parse_rfc3339(&s))
            .transpose()?;
        Ok(Endpoint {
            id: row.id,
            name: row.name,
            url: row.url,
            heartbeat_interval_seconds: row.heartbeat_interval_seconds.max(0) as u64,
            retries: row.retries.max(0) as u32,
            upside_down: row.upside_down != 0,
            paused: row.paused != 0,
            retries_failed_so_far: row.retries_failed_so_far.max(0) as u32,
            status,
            last_checked,
            detail,
        })
    }
}

pub fn endpoint_kind_str(kind: EndpointKind) -> &'static str {
    match kind {
        EndpointKind::Http => "http",
        EndpointKind::Ping => "ping",
        EndpointKind::Tcp => "tcp",
        EndpointKind::KafkaProducer => "kafka_producer",
        EndpointKind::KafkaConsumer => "kafka_consumer",
    }
}

fn parse_status(s: &str) -> Status {
    match s.to_ascii_uppercase().as_str() {
        "UP" => Status::Up,
        "DOWN" => Status::Down,
        _ => Status::Unknown,
    }
}

pub fn status_str(status: Status) -> &'static str {
    match status {
        Status::Up => "UP",
        Status::Down => "DOWN",
        Status::Unknown => "unknown",
    }
}

pub fn parse_rfc3339(s: &str) -> MonitorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MonitorError::Config(format!("bad timestamp {s}: {e}")))
}

#[derive(Debug, Clone, FromRow)]
pub struct ProbeOutcomeRow {
    pub endpoint_id: i64,
    pub instance_id: String,
    pub timestamp: String,
    pub is_ok: i64,
    pub response_time_ms: f64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub location: String,
    pub check_type: String,
    pub metadata_json: Option<String>,
}

impl TryFrom<ProbeOutcomeRow> for ProbeOutcome {
    type Error = MonitorError;

    fn try_from(row: ProbeOutcomeRow) -> MonitorResult<Self> {
        let instance_id: InstanceId = row
            .instance_id
            .parse()
            .map_err(|_| MonitorError::Config("bad instance_id in outcome row".into()))?;
        let check_type = parse_endpoint_kind(&row.check_type)?;
        let metadata = row
            .metadata_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        Ok(ProbeOutcome {
            endpoint_id: row.endpoint_id,
            instance_id,
            timestamp: parse_rfc3339(&row.timestamp)?,
            is_ok: row.is_ok != 0,
            response_time_ms: row.response_time_ms,
            status: parse_status(&row.status),
            failure_reason: row.failure_reason,
            location: row.location,
            check_type,
            metadata,
        })
    }
}

pub fn parse_endpoint_kind(s: &str) -> MonitorResult<EndpointKind> {
    Ok(match s {
        "http" => EndpointKind::Http,
        "ping" => EndpointKind::Ping,
        "tcp" => EndpointKind::Tcp,
        "kafka_producer" => EndpointKind::KafkaProducer,
        "kafka_consumer" => EndpointKind::KafkaConsumer,
        other => return Err(MonitorError::Config(format!("unknown endpoint kind {other}"))),
    })
}

#[derive(Debug, Clone, FromRow)]
pub struct AggregatedResultRow {
    pub endpoint_id: i64,
    pub total_locations: i64,
    pub successful_locations: i64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub consensus: String,
    pub location_results_json: String,
    pub updated_at: String,
}

impl TryFrom<AggregatedResultRow> for AggregatedResult {
    type Error = MonitorError;

    fn try_from(row: AggregatedResultRow) -> MonitorResult<Self> {
        let location_results: Vec<LocationResult> =
            serde_json::from_str(&row.location_results_json)?;
        let consensus = match row.consensus.as_str() {
            "UP" => Consensus::Up,
            "DOWN" => Consensus::Down,
            _ => Consensus::Partial,
        };
        Ok(AggregatedResult {
            endpoint_id: row.endpoint_id,
            total_locations: row.total_locations.max(0) as u32,
            successful_locations: row.successful_locations.max(0) as u32,
            avg_response_time_ms: row.avg_response_time_ms,
            min_response_time_ms: row.min_response_time_ms,
            max_response_time_ms: row.max_response_time_ms,
            consensus,
            location_results,
            updated_at: parse_rfc3339(&row.updated_at)?,
        })
    }
}

pub fn consensus_str(c: Consensus) -> &'static str {
    match c {
        Consensus::Up => "UP",
        Consensus::Down => "DOWN",
        Consensus::Partial => "PARTIAL",
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MonitoringInstanceRow {
    pub instance_id: String,
    pub name: String,
    pub location: Option<String>,
    pub sync_url: Option<String>,
    pub failover_order: i64,
    pub last_heartbeat: String,
    pub status: String,
    pub capabilities_json: String,
    pub system_info_json: Option<String>,
}

impl TryFrom<MonitoringInstanceRow> for MonitoringInstance {
    type Error = MonitorError;

    fn try_from(row: MonitoringInstanceRow) -> MonitorResult<Self> {
        let instance_id: InstanceId = row
            .instance_id
            .parse()
            .map_err(|_| MonitorError::Config("bad instance_id in instance row".into()))?;
        let capabilities: Vec<String> = serde_json::from_str(&row.capabilities_json)?;
        let system_info: Option<SystemInfo> = row
            .system_info_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let status = match row.status.as_str() {
            "promoting" => InstanceStatus::Promoting,
            "inactive" => InstanceStatus::Inactive,
            "failed" => InstanceStatus::Failed,
            _ => InstanceStatus::Active,
        };
        Ok(MonitoringInstance {
            instance_id,
            name: row.name,
            location: row.location,
            sync_url: row.sync_url,
            failover_order: row.failover_order.max(0) as u32,
            last_heartbeat: parse_rfc3339(&row.last_heartbeat)?,
            status,
            capabilities,
            system_info,
        })
    }
}

pub fn instance_status_str(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Active => "active",
        InstanceStatus::Promoting => "promoting",
        InstanceStatus::Inactive => "inactive",
        InstanceStatus::Failed => "failed",
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InstanceTokenRow {
    pub instance_id: String,
    pub token_hash: String,
    pub permissions_json: String,
    pub expires_at: String,
}

impl TryFrom<InstanceTokenRow> for InstanceToken {
    type Error = MonitorError;

    fn try_from(row: InstanceTokenRow) -> MonitorResult<Self> {
        let instance_id: InstanceId = row
            .instance_id
            .parse()
            .map_err(|_| MonitorError::Config("bad instance_id in token row".into()))?;
        let permissions: Vec<String> = serde_json::from_str(&row.permissions_json)?;
        Ok(InstanceToken {
            instance_id,
            token_hash: row.token_hash,
            permissions,
            expires_at: parse_rfc3339(&row.expires_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApplicationLogRow {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub component: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationServiceRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub config_json: String,
}
