//! # Sync protocol — server (C9)
//!
//! Exposed only on the primary, under `/api/sync`. Handlers return
//! `Json<SyncEnvelope<T>>` per spec.md §6; a 10 MiB body cap and
//! bearer-JWT middleware wrap every route.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::error::{MonitorError, MonitorResult};
use crate::role::RoleManager;
use crate::scheduler::Scheduler;
use crate::store::{hash_token, Store};
use crate::types::{InstanceId, InstanceStatus, MonitoringInstance};

use super::envelope::SyncEnvelope;
use super::jwt;
use super::wire::{
    FailoverOrderUpdate, HeartbeatPayload, HeartbeatResponse, InstanceOrder, RegisterRequest,
    RegisterResponse,
};

/// Body size cap, per spec.md §4.9's last line.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct SyncServerState {
    pub store: Arc<Store>,
    pub role: Arc<RoleManager>,
    pub aggregator: Arc<Aggregator>,
    pub scheduler: Arc<Scheduler>,
    pub self_instance_id: InstanceId,
    pub jwt_secret: String,
}

pub fn router(state: SyncServerState) -> Router {
    Router::new()
        .route("/register", axum::routing::post(register))
        .route("/heartbeat", put(heartbeat))
        .route("/endpoints", get(list_endpoints))
        .route("/instances", get(list_instances))
        .route("/instances/health", get(instances_health))
        .route("/instances/:id", delete(delete_instance))
        .route("/failover-order", get(get_failover_order).put(put_failover_order))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth))
        .with_state(state)
}

#[derive(Clone, Copy)]
struct AuthedInstance(InstanceId);

async fn bearer_auth(
    State(state): State<SyncServerState>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    // /register issues tokens and is intentionally exempt.
    if request.uri().path().ends_with("/register") {
        return next.run(request).await;
    }

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return MonitorError::Auth("missing bearer token".into()).into_response();
    };

    let claims = match jwt::verify(&state.jwt_secret, token) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    match state.store.get_token(claims.instance_id).await {
        Ok(Some(stored)) if stored.token_hash == hash_token(token) => {}
        Ok(_) => return MonitorError::Auth("token revoked".into()).into_response(),
        Err(e) => return e.into_response(),
    }

    request.extensions_mut().insert(AuthedInstance(claims.instance_id));
    next.run(request).await
}

async fn require_primary(state: &SyncServerState) -> Result<(), Response> {
    if !state.role.is_primary().await {
        return Err(MonitorError::WrongRole("not primary".into()).into_response());
    }
    Ok(())
}

async fn register(
    State(state): State<SyncServerState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }

    let configured_secret = match state.store.config_get("shared_secret").await {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let Some(configured_secret) = configured_secret else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(SyncEnvelope::<()>::err("no shared secret configured"))).into_response();
    };
    if configured_secret != req.shared_secret {
        return (StatusCode::UNAUTHORIZED, Json(SyncEnvelope::<()>::err("invalid shared secret"))).into_response();
    }

    let instance_id = InstanceId::from(req.instance_id);
    let instance = MonitoringInstance {
        instance_id,
        name: req.instance_name.clone(),
        location: req.location,
        sync_url: req.public_endpoint,
        failover_order: req.failover_order,
        last_heartbeat: Utc::now(),
        status: InstanceStatus::Active,
        capabilities: req.capabilities,
        system_info: Some(req.system_info),
    };
    if let Err(e) = state.store.upsert_instance(&instance).await {
        return e.into_response();
    }

    let token = match jwt::issue(&state.jwt_secret, instance_id, &req.instance_name) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    let expires_at = Utc::now() + jwt::TOKEN_TTL;
    if let Err(e) = state.store.issue_token(instance_id, &hash_token(&token), expires_at).await {
        return e.into_response();
    }

    info!(instance_id = %instance_id, "instance registered");
    Json(SyncEnvelope::ok(RegisterResponse {
        token,
        instance_id: instance_id.as_uuid(),
    }))
    .into_response()
}

async fn heartbeat(
    State(state): State<SyncServerState>,
    axum::Extension(auth): axum::Extension<AuthedInstance>,
    Json(payload): Json<HeartbeatPayload>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    let instance_id = auth.0;
    let now = Utc::now();

    if let Err(e) = state.store.touch_heartbeat(instance_id, now).await {
        return e.into_response();
    }
    let system_info_blob = serde_json::json!({
        "systemMetrics": payload.system_metrics,
        "connectionStatus": payload.connection_status,
    });
    if let Err(e) = state
        .store
        .config_set(&format!("system_{instance_id}"), &system_info_blob.to_string())
        .await
    {
        return e.into_response();
    }
    if let Err(e) = state
        .store
        .config_set(&format!("connection_{instance_id}"), &serde_json::to_string(&payload.connection_status).unwrap_or_default())
        .await
    {
        return e.into_response();
    }

    let mut outcomes = Vec::with_capacity(payload.monitoring_results.len());
    for wire in payload.monitoring_results {
        match crate::types::ProbeOutcome::try_from(wire) {
            Ok(o) => outcomes.push(o),
            Err(e) => warn!(error = %e, "dropping malformed outcome in heartbeat"),
        }
    }
    for outcome in &outcomes {
        if let Err(e) = state.store.append_outcome(outcome).await {
            return e.into_response();
        }
    }
    if let Err(e) = state.aggregator.apply_batch(&outcomes).await {
        return e.into_response();
    }

    Json(SyncEnvelope::ok(HeartbeatResponse { timestamp: now })).into_response()
}

async fn list_endpoints(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
) -> Response {
    match state.store.list_endpoints(false).await {
        Ok(endpoints) => Json(SyncEnvelope::ok(endpoints)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_instances(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    match state.store.list_instances().await {
        Ok(instances) => Json(SyncEnvelope::ok(instances)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn instances_health(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    match state.store.list_instances().await {
        Ok(instances) => {
            let summary: Vec<_> = instances
                .iter()
                .map(|i| serde_json::json!({ "instanceId": i.instance_id, "status": i.status, "lastHeartbeat": i.last_heartbeat }))
                .collect();
            Json(SyncEnvelope::ok(summary)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn delete_instance(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    let id = InstanceId::from(id);
    match state.store.delete_instance(id).await {
        Ok(()) => Json(SyncEnvelope::ok(())).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_failover_order(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    match state.store.list_instances().await {
        Ok(instances) => {
            let orders: Vec<_> = instances
                .into_iter()
                .map(|i| InstanceOrder { instance_id: i.instance_id.as_uuid(), order: i.failover_order })
                .collect();
            Json(SyncEnvelope::ok(orders)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn put_failover_order(
    State(state): State<SyncServerState>,
    axum::Extension(_auth): axum::Extension<AuthedInstance>,
    Json(update): Json<FailoverOrderUpdate>,
) -> Response {
    if let Err(r) = require_primary(&state).await {
        return r;
    }
    for entry in update.instance_orders {
        let id = InstanceId::from(entry.instance_id);
        let instance = match state.store.get_instance(id).await {
            Ok(Some(i)) => i,
            Ok(None) => continue,
            Err(e) => return e.into_response(),
        };
        let updated = MonitoringInstance {
            failover_order: entry.order,
            ..instance
        };
        if let Err(e) = state.store.upsert_instance(&updated).await {
            return e.into_response();
        }
    }
    Json(SyncEnvelope::ok(())).into_response()
}

/// `GET /health` — unauthenticated liveness probe, per spec.md §6.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub type ServerResult<T> = MonitorResult<T>;
