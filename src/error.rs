//! # Error taxonomy
//!
//! Mirrors the abstract error kinds from the design: probe failures never
//! propagate past the scheduler, sync-plane failures surface as structured
//! `{success, error}` envelopes with an HTTP status, and everything else is
//! a `MonitorError` that `?` composes through.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("wrong role for this operation: {0}")]
    WrongRole(String),

    #[error("sync transport error: {0}")]
    SyncTransport(#[from] reqwest::Error),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Error kind for the abstract taxonomy in the design doc §7, used by probe
/// executors where the outcome is recorded rather than propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    Timeout,
    Dns,
    Connect,
    Tls,
    Status,
    MissingKeyword,
    Transport,
}

impl ProbeErrorKind {
    pub fn as_failure_reason(&self, detail: Option<&str>) -> String {
        let base = match self {
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Dns => "dns",
            ProbeErrorKind::Connect => "connect",
            ProbeErrorKind::Tls => "tls",
            ProbeErrorKind::Status => "status",
            ProbeErrorKind::MissingKeyword => "missing_keyword",
            ProbeErrorKind::Transport => "transport",
        };
        match detail {
            Some(d) => format!("{base} {d}"),
            None => base.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::Validation(_) => StatusCode::BAD_REQUEST,
            MonitorError::Serialization(_) => StatusCode::BAD_REQUEST,
            MonitorError::Auth(_) => StatusCode::UNAUTHORIZED,
            MonitorError::WrongRole(_) => StatusCode::FORBIDDEN,
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            MonitorError::Storage(_) | MonitorError::SyncTransport(_) | MonitorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MonitorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = SyncErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
