//! Wire envelope for the sync RPC surface, per spec.md §6.

use serde::Serialize;

use crate::error::MonitorError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> SyncEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl SyncEnvelope<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub type SyncResult<T> = Result<T, MonitorError>;
