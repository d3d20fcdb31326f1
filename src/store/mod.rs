//! # Config store & persistence layer (C1)
//!
//! Table-per-entity sqlite store, following the teacher's
//! `storage/database_simple.rs` shape (a single struct wrapping a pool, one
//! method per query) but swapped to `sqlite` per SPEC_FULL.md §3.5 — this
//! is a single embeddable binary, not a networked coordinator with its own
//! Postgres cluster.

pub mod models;

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::error::{MonitorError, MonitorResult};
use crate::types::{
    AggregatedResult, Endpoint, InstanceId, InstanceToken, MonitoringInstance, ProbeOutcome,
};
use models::*;

/// Identity generated once at first boot and persisted in `instance_config`.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub instance_id: InstanceId,
    pub jwt_secret: String,
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> MonitorResult<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MonitorError::Config(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> MonitorResult<()> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        for statement in schema.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("store schema initialized");
        Ok(())
    }

    // ---------------------------------------------------------------- C1

    pub async fn config_get(&self, key: &str) -> MonitorResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM instance_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> MonitorResult<()> {
        sqlx::query(
            "INSERT INTO instance_config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One-shot atomic initialization of instance identity. Idempotent: if
    /// `instance_id` already exists, returns the persisted identity
    /// unchanged rather than regenerating secrets.
    pub async fn init_identity(&self, shared_secret_env: Option<String>) -> MonitorResult<InstanceIdentity> {
        if let Some(existing) = self.config_get("instance_id").await? {
            let instance_id: InstanceId = existing
                .parse()
                .map_err(|_| MonitorError::Config("corrupt instance_id".into()))?;
            let jwt_secret = self
                .config_get("jwt_secret")
                .await?
                .ok_or_else(|| MonitorError::Config("missing jwt_secret for existing instance".into()))?;
            let shared_secret = self.config_get("shared_secret").await?;
            return Ok(InstanceIdentity {
                instance_id,
                jwt_secret,
                shared_secret,
            });
        }

        let instance_id = InstanceId::new();
        let jwt_secret = random_hex(32);
        self.config_set("instance_id", &instance_id.to_string()).await?;
        self.config_set("jwt_secret", &jwt_secret).await?;
        if let Some(secret) = &shared_secret_env {
            self.config_set("shared_secret", secret).await?;
        }
        Ok(InstanceIdentity {
            instance_id,
            jwt_secret,
            shared_secret: shared_secret_env,
        })
    }

    // ---------------------------------------------------------- Endpoints

    pub async fn list_endpoints(&self, include_paused: bool) -> MonitorResult<Vec<Endpoint>> {
        let rows: Vec<EndpointRow> = if include_paused {
            sqlx::query_as("SELECT * FROM endpoints")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM endpoints WHERE paused = 0")
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(Endpoint::try_from).collect()
    }

    pub async fn get_endpoint(&self, id: i64) -> MonitorResult<Option<Endpoint>> {
        let row: Option<EndpointRow> = sqlx::query_as("SELECT * FROM endpoints WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Endpoint::try_from).transpose()
    }

    pub async fn upsert_endpoint(&self, endpoint: &Endpoint) -> MonitorResult<i64> {
        let detail_json = serde_json::to_string(&endpoint.detail)?;
        let last_checked = endpoint.last_checked.map(|t| t.to_rfc3339());
        if endpoint.id == 0 {
            let row = sqlx::query(
                "INSERT INTO endpoints
                 (name, kind, url, heartbeat_interval_seconds, retries, upside_down,
                  paused, retries_failed_so_far, status, last_checked, detail_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&endpoint.name)
            .bind(endpoint_kind_str(endpoint.kind()))
            .bind(&endpoint.url)
            .bind(endpoint.heartbeat_interval_seconds.max(10) as i64)
            .bind(endpoint.retries as i64)
            .bind(endpoint.upside_down as i64)
            .bind(endpoint.paused as i64)
            .bind(endpoint.retries_failed_so_far as i64)
            .bind(status_str(endpoint.status))
            .bind(&last_checked)
            .bind(&detail_json)
            .execute(&self.pool)
            .await?;
            Ok(row.last_insert_rowid())
        } else {
            sqlx::query(
                "UPDATE endpoints SET name=?, kind=?, url=?, heartbeat_interval_seconds=?,
                 retries=?, upside_down=?, paused=?, retries_failed_so_far=?, status=?,
                 last_checked=?, detail_json=? WHERE id=?",
            )
            .bind(&endpoint.name)
            .bind(endpoint_kind_str(endpoint.kind()))
            .bind(&endpoint.url)
            .bind(endpoint.heartbeat_interval_seconds.max(10) as i64)
            .bind(endpoint.retries as i64)
            .bind(endpoint.upside_down as i64)
            .bind(endpoint.paused as i64)
            .bind(endpoint.retries_failed_so_far as i64)
            .bind(status_str(endpoint.status))
            .bind(&last_checked)
            .bind(&detail_json)
            .bind(endpoint.id)
            .execute(&self.pool)
            .await?;
            Ok(endpoint.id)
        }
    }

    pub async fn delete_endpoint(&self, id: i64) -> MonitorResult<()> {
        sqlx::query("DELETE FROM endpoint_notifiers WHERE endpoint_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------- Probe outcomes

    pub async fn append_outcome(&self, outcome: &ProbeOutcome) -> MonitorResult<()> {
        sqlx::query(
            "INSERT INTO probe_outcomes
             (endpoint_id, instance_id, timestamp, is_ok, response_time_ms, status,
              failure_reason, location, check_type, metadata_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(outcome.endpoint_id)
        .bind(outcome.instance_id.to_string())
        .bind(outcome.timestamp.to_rfc3339())
        .bind(outcome.is_ok as i64)
        .bind(outcome.response_time_ms)
        .bind(status_str(outcome.status))
        .bind(&outcome.failure_reason)
        .bind(&outcome.location)
        .bind(endpoint_kind_str(outcome.check_type))
        .bind(outcome.metadata.as_ref().map(|v| v.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Outcomes for one endpoint within `[since, now]`, ascending by time.
    pub async fn outcomes_since(
        &self,
        endpoint_id: i64,
        since: chrono::DateTime<Utc>,
    ) -> MonitorResult<Vec<ProbeOutcome>> {
        let rows: Vec<ProbeOutcomeRow> = sqlx::query_as(
            "SELECT * FROM probe_outcomes WHERE endpoint_id = ? AND timestamp >= ?
             ORDER BY timestamp ASC",
        )
        .bind(endpoint_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProbeOutcome::try_from).collect()
    }

    /// Retention sweep: drop outcomes older than 7 days (spec.md §3).
    pub async fn prune_outcomes(&self, older_than: chrono::DateTime<Utc>) -> MonitorResult<u64> {
        let result = sqlx::query("DELETE FROM probe_outcomes WHERE timestamp < ?")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --------------------------------------------------- Aggregated results

    pub async fn get_aggregated(&self, endpoint_id: i64) -> MonitorResult<Option<AggregatedResult>> {
        let row: Option<AggregatedResultRow> =
            sqlx::query_as("SELECT * FROM aggregated_results WHERE endpoint_id = ?")
                .bind(endpoint_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AggregatedResult::try_from).transpose()
    }

    pub async fn put_aggregated(&self, agg: &AggregatedResult) -> MonitorResult<()> {
        let location_results_json = serde_json::to_string(&agg.location_results)?;
        sqlx::query(
            "INSERT INTO aggregated_results
             (endpoint_id, total_locations, successful_locations, avg_response_time_ms,
              min_response_time_ms, max_response_time_ms, consensus, location_results_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(endpoint_id) DO UPDATE SET
                total_locations=excluded.total_locations,
                successful_locations=excluded.successful_locations,
                avg_response_time_ms=excluded.avg_response_time_ms,
                min_response_time_ms=excluded.min_response_time_ms,
                max_response_time_ms=excluded.max_response_time_ms,
                consensus=excluded.consensus,
                location_results_json=excluded.location_results_json,
                updated_at=excluded.updated_at",
        )
        .bind(agg.endpoint_id)
        .bind(agg.total_locations as i64)
        .bind(agg.successful_locations as i64)
        .bind(agg.avg_response_time_ms)
        .bind(agg.min_response_time_ms)
        .bind(agg.max_response_time_ms)
        .bind(consensus_str(agg.consensus))
        .bind(&location_results_json)
        .bind(agg.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --------------------------------------------------- Monitoring instances

    pub async fn upsert_instance(&self, instance: &MonitoringInstance) -> MonitorResult<()> {
        let capabilities_json = serde_json::to_string(&instance.capabilities)?;
        let system_info_json = instance
            .system_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO monitoring_instances
             (instance_id, name, location, sync_url, failover_order, last_heartbeat,
              status, capabilities_json, system_info_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(instance_id) DO UPDATE SET
                name=excluded.name, location=excluded.location, sync_url=excluded.sync_url,
                failover_order=excluded.failover_order, last_heartbeat=excluded.last_heartbeat,
                status=excluded.status, capabilities_json=excluded.capabilities_json,
                system_info_json=excluded.system_info_json",
        )
        .bind(instance.instance_id.to_string())
        .bind(&instance.name)
        .bind(&instance.location)
        .bind(&instance.sync_url)
        .bind(instance.failover_order as i64)
        .bind(instance.last_heartbeat.to_rfc3339())
        .bind(instance_status_str(instance.status))
        .bind(&capabilities_json)
        .bind(&system_info_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_instance(&self, id: InstanceId) -> MonitorResult<Option<MonitoringInstance>> {
        let row: Option<MonitoringInstanceRow> =
            sqlx::query_as("SELECT * FROM monitoring_instances WHERE instance_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(MonitoringInstance::try_from).transpose()
    }

    pub async fn list_instances(&self) -> MonitorResult<Vec<MonitoringInstance>> {
        let rows: Vec<MonitoringInstanceRow> =
            sqlx::query_as("SELECT * FROM monitoring_instances")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(MonitoringInstance::try_from).collect()
    }

    pub async fn delete_instance(&self, id: InstanceId) -> MonitorResult<()> {
        sqlx::query("DELETE FROM monitoring_instances WHERE instance_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM instance_tokens WHERE instance_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_instance_status(&self, id: InstanceId, status: crate::types::InstanceStatus) -> MonitorResult<()> {
        sqlx::query("UPDATE monitoring_instances SET status = ? WHERE instance_id = ?")
            .bind(instance_status_str(status))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_heartbeat(&self, id: InstanceId, at: chrono::DateTime<Utc>) -> MonitorResult<()> {
        sqlx::query("UPDATE monitoring_instances SET last_heartbeat = ? WHERE instance_id = ?")
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reap_stale_instances(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> MonitorResult<Vec<InstanceId>> {
        let rows: Vec<MonitoringInstanceRow> = sqlx::query_as(
            "SELECT * FROM monitoring_instances WHERE status = 'active' AND last_heartbeat < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        let mut reaped = Vec::new();
        for row in rows {
            let instance: MonitoringInstance = row.try_into()?;
            self.set_instance_status(instance.instance_id, crate::types::InstanceStatus::Inactive)
                .await?;
            reaped.push(instance.instance_id);
        }
        Ok(reaped)
    }

    // ------------------------------------------------------------- Tokens

    pub async fn issue_token(&self, id: InstanceId, token_hash: &str, expires_at: chrono::DateTime<Utc>) -> MonitorResult<()> {
        sqlx::query(
            "INSERT INTO instance_tokens (instance_id, token_hash, permissions_json, expires_at)
             VALUES (?, ?, '[]', ?)
             ON CONFLICT(instance_id) DO UPDATE SET
                token_hash=excluded.token_hash, expires_at=excluded.expires_at",
        )
        .bind(id.to_string())
        .bind(token_hash)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_token(&self, id: InstanceId) -> MonitorResult<Option<InstanceToken>> {
        let row: Option<InstanceTokenRow> =
            sqlx::query_as("SELECT * FROM instance_tokens WHERE instance_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(InstanceToken::try_from).transpose()
    }

    // --------------------------------------------------------------- Logs

    pub async fn append_log(&self, level: &str, message: &str, component: &str) -> MonitorResult<()> {
        sqlx::query(
            "INSERT INTO application_logs (level, message, component, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(level)
        .bind(message)
        .bind(component)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_logs(&self, n: i64) -> MonitorResult<Vec<ApplicationLogRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM application_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn clear_logs(&self) -> MonitorResult<()> {
        sqlx::query("DELETE FROM application_logs").execute(&self.pool).await?;
        Ok(())
    }

    // --------------------------------------------------------- Notifiers

    pub async fn notifiers_for_endpoint(&self, endpoint_id: i64) -> MonitorResult<Vec<NotificationServiceRow>> {
        let rows = sqlx::query_as(
            "SELECT notification_services.* FROM notification_services
             JOIN endpoint_notifiers ON endpoint_notifiers.notifier_id = notification_services.id
             WHERE endpoint_notifiers.endpoint_id = ?",
        )
        .bind(endpoint_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex_of(&buf)
}

fn hex_of(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_of(hasher.finalize().as_slice())
}
